//! Bundler adapter that runs an external program per build
//!
//! The program receives its inputs through `PACKD_*` environment variables
//! and must write the bundle to stdout.

use super::{BuildInputs, BundleBuilder};
use crate::cache::CacheKey;
use crate::error::{BuildError, BuildErrorKind, PackdError, PackdResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 20;

/// Extract the useful tail of bundler output for error diagnostics.
pub(crate) fn build_error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let total = lines.len();
    let tail: Vec<&str> = if total > BUILD_ERROR_TAIL_LINES {
        lines[total - BUILD_ERROR_TAIL_LINES..].to_vec()
    } else {
        lines
    };
    tail.join("\n")
}

/// Runs `build.command` once per bundle
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
}

impl CommandBuilder {
    pub fn new(command: &[String]) -> PackdResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| PackdError::User("build.command is empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn failure(&self, key: &CacheKey, inputs: &BuildInputs, message: String) -> PackdError {
        PackdError::Build(BuildError {
            kind: BuildErrorKind::Build,
            package: inputs.package.clone(),
            version: inputs.version.clone(),
            key: key.to_string(),
            message,
        })
    }
}

#[async_trait]
impl BundleBuilder for CommandBuilder {
    async fn build(&self, key: &CacheKey, inputs: &BuildInputs) -> PackdResult<String> {
        debug!(
            "Running {} for {}@{}",
            self.program, inputs.package, inputs.version
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .env("PACKD_KEY", key.as_str())
            .env("PACKD_PACKAGE", &inputs.package)
            .env("PACKD_VERSION", &inputs.version)
            .env("PACKD_SUBPATH", inputs.subpath.as_deref().unwrap_or(""))
            .env("PACKD_QUERY", inputs.query.canonical())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.failure(key, inputs, format!("spawning {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(
                key,
                inputs,
                format!(
                    "{} exited with {}\n{}",
                    self.program,
                    output.status,
                    build_error_output(&stdout, &stderr)
                ),
            ));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| self.failure(key, inputs, "bundle output is not valid UTF-8".to_string()))
    }
}
