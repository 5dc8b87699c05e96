//! Content-addressed bundle cache
//!
//! Bundles are keyed by a SHA256 over the normalized request. Only concrete
//! versions ever reach the cache, so a key's content never changes.
//!
//! # Key States
//!
//! | State | Where | Description |
//! |-------|-------|-------------|
//! | Absent | - | Never built, or the last attempt failed |
//! | Building | in-flight registry | One build running, others waiting on it |
//! | Cached | store | Written once, served from then on |

pub mod key;
pub mod store;

pub use key::{derive_key, CacheKey, Ecosystem};
pub use store::{BundleArtifact, CacheHandle, CacheStore, FsCacheStore, MemoryCacheStore};
