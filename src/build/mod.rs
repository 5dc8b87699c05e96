//! Bundle building
//!
//! The bundler itself is external. This module defines the interface the
//! orchestrator drives and an adapter that shells out to a configured
//! bundler program.

mod command;

pub use command::CommandBuilder;

use crate::cache::CacheKey;
use crate::error::PackdResult;
use crate::specifier::Query;
use async_trait::async_trait;

/// Everything a builder needs to produce one bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInputs {
    /// Qualified package name
    pub package: String,
    /// Concrete version
    pub version: String,
    /// Module path within the package
    pub subpath: Option<String>,
    /// Bundle options
    pub query: Query,
}

/// Abstract bundle builder interface
#[async_trait]
pub trait BundleBuilder: Send + Sync {
    /// Build the bundle for `inputs`, returning its JavaScript source
    async fn build(&self, key: &CacheKey, inputs: &BuildInputs) -> PackdResult<String>;
}
