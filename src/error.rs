//! Error types for packd
//!
//! All modules use `PackdResult<T>` as their return type. Failures that can
//! be shared between coalesced waiters are carried by [`BuildError`], which
//! is `Clone` so a single build outcome can be fanned out.

use axum::http::StatusCode;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for packd operations
pub type PackdResult<T> = Result<T, PackdError>;

/// All errors that can occur in packd
#[derive(Error, Debug)]
pub enum PackdError {
    // Request errors
    #[error("Invalid module ID {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Failed in fetching package from the registry {package}: {reason}")]
    Registry { package: String, reason: String },

    #[error("Invalid module {package}: registry returned no versions")]
    InvalidPackage { package: String },

    #[error("Invalid tag {tag} for {package}")]
    InvalidTag { package: String, tag: String },

    #[error("Invalid METHOD {0}")]
    MethodNotAllowed(String),

    // Build errors
    #[error(transparent)]
    Build(#[from] BuildError),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    User(String),
}

impl PackdError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a parse error for a request path
    pub fn parse(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a registry error for a package
    pub fn registry(package: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Registry {
            package: package.into(),
            reason: reason.to_string(),
        }
    }

    /// HTTP status a request failing with this error is answered with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Parse { .. }
            | Self::Registry { .. }
            | Self::InvalidPackage { .. }
            | Self::InvalidTag { .. } => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable tag used in structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::Registry { .. } => "registry",
            Self::InvalidPackage { .. } => "invalid_package",
            Self::InvalidTag { .. } => "invalid_tag",
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::Build(e) => e.kind.as_str(),
            Self::ConfigInvalid { .. } | Self::ConfigDirCreate { .. } => "config",
            Self::Io { .. } => "io",
            Self::Json(_) | Self::TomlSerialize(_) => "serialization",
            Self::User(_) => "user",
        }
    }

    /// Check if a fresh attempt could succeed without the request changing
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Registry { .. } => true,
            Self::Build(e) => matches!(e.kind, BuildErrorKind::Timeout | BuildErrorKind::Aborted),
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => Some("Run: packd config init --force"),
            Self::User(msg) if msg.contains("build.command") => {
                Some("Set [build] command = [\"<bundler>\", ...] in the config file")
            }
            _ => None,
        }
    }
}

/// Which stage of an in-flight build failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildErrorKind {
    /// The bundle builder reported a failure
    Build,
    /// Reading or writing the cache store failed
    CacheStore,
    /// The build exceeded the configured time limit
    Timeout,
    /// The build task panicked or was cancelled by the runtime
    Aborted,
}

impl BuildErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::CacheStore => "cache_store",
            Self::Timeout => "build_timeout",
            Self::Aborted => "build_aborted",
        }
    }
}

impl fmt::Display for BuildErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed build, shared by every request waiting on the same cache key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} failed for {package}@{version} ({key}): {message}")]
pub struct BuildError {
    pub kind: BuildErrorKind,
    pub package: String,
    pub version: String,
    pub key: String,
    pub message: String,
}
