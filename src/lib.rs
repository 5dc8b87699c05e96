//! packd - npm packages as cached browser bundles
//!
//! Resolves `[@scope/]name[@tag][/subpath][?query]` requests to concrete
//! versions, redirects floating tags to them, and serves gzipped bundles
//! from a content-addressed cache, building each missing key once no
//! matter how many requests arrive for it.

pub mod build;
pub mod cache;
pub mod cli;
pub mod compress;
pub mod config;
pub mod error;
pub mod orchestration;
pub mod registry;
pub mod resolve;
pub mod server;
pub mod specifier;

pub use error::{PackdError, PackdResult};
