//! Content-addressed cache keys
//!
//! A key is the SHA256 of the normalized request
//! `name@version[_subpath][?sorted-query]`. Same inputs = same bundle.

use crate::specifier::Query;
use sha2::{Digest, Sha256};
use std::fmt;

/// Package ecosystems a bundle can originate from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ecosystem {
    /// npm registry packages
    Npm,
}

impl Ecosystem {
    /// Directory name used by on-disk cache stores
    pub fn cache_dir(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Npm => "npm",
        };
        write!(f, "{}", name)
    }
}

/// Hex-encoded digest identifying one buildable bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name the bundle is stored under
    pub fn bundle_name(&self) -> String {
        format!("{}.js", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized request string hashed into a [`CacheKey`]
pub fn canonical_request(name: &str, version: &str, subpath: Option<&str>, query: &Query) -> String {
    let mut canonical = format!("{}@{}", name, version);
    if let Some(subpath) = subpath {
        canonical.push('_');
        canonical.push_str(&subpath.replace(['/', '\\'], "_"));
    }
    canonical.push_str(&query.canonical());
    canonical
}

/// Derive the cache key for a concrete-version request
pub fn derive_key(name: &str, version: &str, subpath: Option<&str>, query: &Query) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(canonical_request(name, version, subpath, query).as_bytes());
    CacheKey(hex::encode(hasher.finalize()))
}
