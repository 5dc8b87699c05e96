//! Coalescing build coordinator
//!
//! Serves a bundle from the cache store when present; otherwise joins the
//! build already running for the key, or starts exactly one.
//!
//! # Key Lifecycle
//!
//! `Absent -> Building -> Cached | Failed`. A failed attempt leaves nothing
//! behind: the in-flight entry is removed before waiters are told and
//! nothing is written, so the next request starts over.

use super::inflight::{BuildOutcome, InFlightGuard, InFlightRegistry};
use crate::build::{BuildInputs, BundleBuilder};
use crate::cache::{CacheKey, CacheStore, Ecosystem};
use crate::compress::gzip_blocking;
use crate::error::{BuildError, BuildErrorKind, PackdError};
use bytes::Bytes;
use futures_util::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Hands out gzipped bundles, building each distinct key at most once at a time
#[derive(Clone)]
pub struct BuildCoordinator {
    store: Arc<dyn CacheStore>,
    builder: Arc<dyn BundleBuilder>,
    in_flight: Arc<InFlightRegistry>,
    build_timeout: Option<Duration>,
}

impl BuildCoordinator {
    pub fn new(
        store: Arc<dyn CacheStore>,
        builder: Arc<dyn BundleBuilder>,
        in_flight: Arc<InFlightRegistry>,
    ) -> Self {
        Self {
            store,
            builder,
            in_flight,
            build_timeout: None,
        }
    }

    /// Fail builds that run longer than `timeout`
    pub fn with_build_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.build_timeout = timeout;
        self
    }

    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    /// Get the gzipped bundle for `key`, building it if needed
    pub async fn obtain(&self, key: &CacheKey, inputs: &BuildInputs) -> BuildOutcome {
        debug!("[{}] requested bundle {}", inputs.package, key);

        if let Some(zipped) = serve_cached(self.store.as_ref(), key, inputs).await? {
            info!("[{}] is cached", inputs.package);
            return Ok(zipped);
        }

        let (build, started) = self.in_flight.join_or_start(key, || {
            let task = BuildTask {
                store: Arc::clone(&self.store),
                builder: Arc::clone(&self.builder),
                guard: InFlightGuard::new(Arc::clone(&self.in_flight), key.clone()),
                key: key.clone(),
                inputs: inputs.clone(),
                timeout: self.build_timeout,
            };
            // Spawned so the build finishes even if every requester goes away
            let handle = tokio::spawn(task.run());
            let (key, inputs) = (key.clone(), inputs.clone());
            async move {
                handle.await.unwrap_or_else(|e| {
                    Err(failure(BuildErrorKind::Aborted, &key, &inputs, e.to_string()))
                })
            }
            .boxed()
        });

        if started {
            info!("[{}] is not cached, building {}", inputs.package, key);
        } else {
            info!("[{}] request was already in progress", inputs.package);
        }

        build.await
    }
}

/// One build attempt; owns the in-flight entry until it finishes
struct BuildTask {
    store: Arc<dyn CacheStore>,
    builder: Arc<dyn BundleBuilder>,
    guard: InFlightGuard,
    key: CacheKey,
    inputs: BuildInputs,
    timeout: Option<Duration>,
}

impl BuildTask {
    async fn run(self) -> BuildOutcome {
        let Self {
            store,
            builder,
            guard,
            key,
            inputs,
            timeout,
        } = self;

        let outcome = build_and_store(store.as_ref(), builder.as_ref(), &key, &inputs, timeout).await;
        // Entry goes before any waiter observes the outcome
        drop(guard);

        if let Err(e) = &outcome {
            error!("[{}] {}", inputs.package, e);
        }
        outcome
    }
}

async fn build_and_store(
    store: &dyn CacheStore,
    builder: &dyn BundleBuilder,
    key: &CacheKey,
    inputs: &BuildInputs,
    timeout: Option<Duration>,
) -> BuildOutcome {
    // A build for this key may have finished between the caller's cache
    // check and this task starting
    if let Some(zipped) = serve_cached(store, key, inputs).await? {
        debug!("[{}] built by an earlier request", inputs.package);
        return Ok(zipped);
    }

    let build = builder.build(key, inputs);
    let source = match timeout {
        Some(limit) => tokio::time::timeout(limit, build).await.map_err(|_| {
            failure(
                BuildErrorKind::Timeout,
                key,
                inputs,
                format!("build exceeded {}s", limit.as_secs_f64()),
            )
        })?,
        None => build.await,
    }
    .map_err(|e| builder_failure(e, key, inputs))?;

    let raw = Bytes::from(source);
    let zipped = gzip_blocking(raw.clone())
        .await
        .map_err(|e| failure(BuildErrorKind::Build, key, inputs, format!("compressing: {}", e)))?;

    store
        .set(
            &key.bundle_name(),
            &raw,
            &inputs.package,
            &inputs.version,
            Ecosystem::Npm,
        )
        .await
        .map_err(|e| failure(BuildErrorKind::CacheStore, key, inputs, e.to_string()))?;

    info!(
        "[{}] built {} bytes ({} gzipped)",
        inputs.package,
        raw.len(),
        zipped.len()
    );
    Ok(zipped)
}

/// Gzipped bundle from the store, if stored
async fn serve_cached(
    store: &dyn CacheStore,
    key: &CacheKey,
    inputs: &BuildInputs,
) -> Result<Option<Bytes>, BuildError> {
    let store_failure = |e: PackdError| failure(BuildErrorKind::CacheStore, key, inputs, e.to_string());

    let Some(handle) = store
        .has(&key.bundle_name(), &inputs.package, &inputs.version, Ecosystem::Npm)
        .await
        .map_err(store_failure)?
    else {
        return Ok(None);
    };

    let artifact = store.get(&handle).await.map_err(store_failure)?;
    gzip_blocking(artifact.raw_content)
        .await
        .map(Some)
        .map_err(|e| failure(BuildErrorKind::Build, key, inputs, format!("compressing: {}", e)))
}

fn failure(kind: BuildErrorKind, key: &CacheKey, inputs: &BuildInputs, message: String) -> BuildError {
    BuildError {
        kind,
        package: inputs.package.clone(),
        version: inputs.version.clone(),
        key: key.to_string(),
        message,
    }
}

fn builder_failure(err: PackdError, key: &CacheKey, inputs: &BuildInputs) -> BuildError {
    match err {
        PackdError::Build(e) => e,
        other => failure(BuildErrorKind::Build, key, inputs, other.to_string()),
    }
}
