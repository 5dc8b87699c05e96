//! Registry of builds currently running, one per cache key

use crate::cache::CacheKey;
use crate::error::BuildError;
use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Result every waiter of one build receives: gzipped bundle or the shared failure
pub type BuildOutcome = Result<Bytes, BuildError>;

/// Handle to a running build; clones resolve to the same outcome
pub type SharedBuild = Shared<BoxFuture<'static, BuildOutcome>>;

/// Process-wide map of in-flight builds.
///
/// Owned by the coordinator and injected, so tests can inspect it.
#[derive(Default)]
pub struct InFlightRegistry {
    builds: Mutex<HashMap<CacheKey, SharedBuild>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the build running for `key`, or start one with `start`.
    ///
    /// Lookup and insertion happen under a single lock acquisition and
    /// `start` must not block, so two callers can never both start a build
    /// for the same key. Returns the handle and whether this call started it.
    pub fn join_or_start<F>(&self, key: &CacheKey, start: F) -> (SharedBuild, bool)
    where
        F: FnOnce() -> BoxFuture<'static, BuildOutcome>,
    {
        let mut builds = self.lock();
        if let Some(existing) = builds.get(key) {
            return (existing.clone(), false);
        }

        let build = start().shared();
        builds.insert(key.clone(), build.clone());
        (build, true)
    }

    /// Drop the entry for `key`; later requests start a fresh build
    pub fn remove(&self, key: &CacheKey) {
        self.lock().remove(key);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, SharedBuild>> {
        // Every critical section is a single map operation, so a poisoned map is still consistent
        self.builds.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Removes a key from the registry when dropped, including on panic
pub(crate) struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    key: CacheKey,
}

impl InFlightGuard {
    pub(crate) fn new(registry: Arc<InFlightRegistry>, key: CacheKey) -> Self {
        Self { registry, key }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.key);
    }
}
