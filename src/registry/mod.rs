//! Package registry access
//!
//! Provides a trait for metadata lookups so the version resolver can be
//! driven by the live npm registry or by an in-memory fixture.

mod http;

pub use http::HttpRegistry;

use crate::error::{PackdError, PackdResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Package document as served by an npm-compatible registry.
///
/// Only the fields the resolver reads are modelled; `versions` stays
/// optional so a document without it surfaces as `InvalidPackage`
/// rather than a decode failure.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPackageDocument {
    pub name: String,

    #[serde(default)]
    pub versions: Option<BTreeMap<String, serde_json::Value>>,

    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
}

/// Validated package metadata
#[derive(Debug, Clone)]
pub struct PackageMetadata {
    /// Qualified package name as reported by the registry
    pub name: String,
    /// Published versions keyed by version string
    pub versions: BTreeMap<String, serde_json::Value>,
    /// Dist-tag to version mapping (`latest`, `next`, ...)
    pub dist_tags: BTreeMap<String, String>,
}

impl PackageMetadata {
    /// Validate a decoded registry document
    pub fn from_document(requested: &str, doc: RawPackageDocument) -> PackdResult<Self> {
        let versions = doc.versions.ok_or_else(|| PackdError::InvalidPackage {
            package: requested.to_string(),
        })?;

        Ok(Self {
            name: doc.name,
            versions,
            dist_tags: doc.dist_tags,
        })
    }

    /// Decode and validate a registry response body
    pub fn from_json(requested: &str, body: &str) -> PackdResult<Self> {
        let doc: RawPackageDocument =
            serde_json::from_str(body).map_err(|e| PackdError::registry(requested, e))?;
        Self::from_document(requested, doc)
    }
}

/// Abstract registry client interface
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch metadata for a qualified package name (`@scope/name` or `name`)
    async fn fetch_metadata(&self, qualified_name: &str) -> PackdResult<PackageMetadata>;
}
