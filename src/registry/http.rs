//! HTTP registry client backed by `ureq`
//!
//! `ureq` is blocking, so every request runs on the tokio blocking pool.

use super::{PackageMetadata, RegistryClient};
use crate::config::schema::RegistryConfig;
use crate::error::{PackdError, PackdResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Abbreviated metadata document; carries name, versions and dist-tags only
const ACCEPT_ABBREVIATED: &str =
    "application/vnd.npm.install-v1+json; q=1.0, application/json; q=0.8";

/// Upper bound on a metadata document body
const MAX_METADATA_BYTES: u64 = 64 * 1024 * 1024;

/// npm-compatible registry reached over HTTP
#[derive(Clone)]
pub struct HttpRegistry {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpRegistry {
    pub fn new(config: &RegistryConfig) -> Self {
        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(timeout)
            .build()
            .into();

        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    /// Metadata URL for a qualified name; the scope separator is escaped
    /// so `@scope/name` stays a single path segment.
    pub fn metadata_url(&self, qualified_name: &str) -> String {
        format!("{}/{}", self.base_url, qualified_name.replace('/', "%2F"))
    }
}

#[async_trait]
impl RegistryClient for HttpRegistry {
    async fn fetch_metadata(&self, qualified_name: &str) -> PackdResult<PackageMetadata> {
        let url = self.metadata_url(qualified_name);
        let agent = self.agent.clone();
        debug!("Fetching registry metadata: {}", url);

        let body = tokio::task::spawn_blocking(move || -> Result<String, ureq::Error> {
            let mut response = agent
                .get(&url)
                .header("Accept", ACCEPT_ABBREVIATED)
                .call()?;
            response
                .body_mut()
                .with_config()
                .limit(MAX_METADATA_BYTES)
                .read_to_string()
        })
        .await
        .map_err(|e| PackdError::registry(qualified_name, e))?
        .map_err(|e| PackdError::registry(qualified_name, e))?;

        PackageMetadata::from_json(qualified_name, &body)
    }
}
