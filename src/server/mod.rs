//! HTTP surface
//!
//! A single fallback handler covers every path: the path itself is the
//! package specifier, so there is nothing to route on.

pub mod response;

use crate::build::{BuildInputs, CommandBuilder};
use crate::cache::{derive_key, CacheStore, FsCacheStore, MemoryCacheStore};
use crate::config::{CacheBackend, Config, ConfigManager};
use crate::error::{PackdError, PackdResult};
use crate::orchestration::{BuildCoordinator, InFlightRegistry};
use crate::registry::{HttpRegistry, RegistryClient};
use crate::resolve::VersionResolver;
use crate::specifier::{canonical_url, PackageSpecifier};
use axum::extract::State;
use axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use axum::response::Response;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared state behind every request
pub struct AppState {
    registry: Arc<dyn RegistryClient>,
    coordinator: BuildCoordinator,
    additional_headers: HeaderMap,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        coordinator: BuildCoordinator,
        additional_headers: HeaderMap,
    ) -> Self {
        Self {
            registry,
            coordinator,
            additional_headers,
        }
    }

    /// Wire up the live collaborators described by `config`
    pub fn from_config(config: &Config) -> PackdResult<Self> {
        let registry: Arc<dyn RegistryClient> = Arc::new(HttpRegistry::new(&config.registry));

        let store: Arc<dyn CacheStore> = match config.cache.backend {
            CacheBackend::Fs => {
                let dir = ConfigManager::cache_dir(config);
                info!("Caching bundles in {}", dir.display());
                Arc::new(FsCacheStore::new(dir))
            }
            CacheBackend::Memory => {
                info!("Caching bundles in memory");
                Arc::new(MemoryCacheStore::new())
            }
        };

        let builder = Arc::new(CommandBuilder::new(&config.build.command)?);
        let timeout = (config.build.timeout_secs > 0)
            .then(|| Duration::from_secs(config.build.timeout_secs));
        let coordinator = BuildCoordinator::new(store, builder, Arc::new(InFlightRegistry::new()))
            .with_build_timeout(timeout);

        Ok(Self::new(
            registry,
            coordinator,
            header_map(&config.server.additional_headers)?,
        ))
    }
}

/// Convert configured header pairs, rejecting invalid names or values
pub fn header_map<'a>(
    pairs: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> PackdResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            PackdError::User(format!("Invalid header name in server.additional_headers: {}", name))
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            PackdError::User(format!("Invalid value for header {} in server.additional_headers", name))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new().fallback(handle).with_state(Arc::new(state))
}

/// Serve until ctrl-c
pub async fn serve(listener: TcpListener, state: AppState) -> PackdResult<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .map_err(|e| PackdError::io("serving HTTP", e))
}

async fn handle(State(state): State<Arc<AppState>>, method: Method, uri: Uri) -> Response {
    let mut resp = if method == Method::OPTIONS {
        response::preflight()
    } else if method == Method::GET {
        match serve_bundle(&state, &uri).await {
            Ok(resp) => resp,
            Err(e) => {
                if e.status_code().is_server_error() {
                    error!(kind = e.kind(), "GET {}: {}", uri, e);
                } else {
                    warn!(kind = e.kind(), retryable = e.is_retryable(), "GET {}: {}", uri, e);
                }
                response::error(&e)
            }
        }
    } else {
        // No registry, cache or builder work for other verbs
        debug!("Rejecting {} {}", method, uri);
        response::error(&PackdError::MethodNotAllowed(method.to_string()))
    };

    resp.headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    resp
}

async fn serve_bundle(state: &AppState, uri: &Uri) -> PackdResult<Response> {
    let spec = PackageSpecifier::parse(uri.path(), uri.query())?;
    let resolved = VersionResolver::new(state.registry.as_ref())
        .resolve(&spec)
        .await?;

    if !resolved.is_canonical_request {
        let location = canonical_url(
            &resolved.package,
            &resolved.version,
            spec.subpath.as_deref(),
            &spec.query,
        );
        debug!("Redirecting {} to {}", uri, location);
        return response::redirect(&location);
    }

    let key = derive_key(
        &resolved.package,
        &resolved.version,
        spec.subpath.as_deref(),
        &spec.query,
    );
    let inputs = BuildInputs {
        package: resolved.package,
        version: resolved.version,
        subpath: spec.subpath,
        query: spec.query,
    };

    let zipped = state.coordinator.obtain(&key, &inputs).await?;
    info!("[{}] serving {} bytes", inputs.package, zipped.len());
    Ok(response::bundle(zipped, &state.additional_headers))
}
