//! Bundle cache stores
//!
//! Bundles are stored uncompressed and written at most once per key: the
//! key's inputs fully determine the content, so an existing entry is never
//! replaced.

use super::key::Ecosystem;
use crate::error::{PackdError, PackdResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::fs;
use tracing::debug;

/// A stored bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleArtifact {
    /// Uncompressed bundle source
    pub raw_content: Bytes,
    /// When the bundle was first written
    pub created_at: DateTime<Utc>,
}

/// Location of a cached bundle, as returned by [`CacheStore::has`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheHandle(PathBuf);

impl CacheHandle {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Abstract bundle storage interface
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a bundle, returning a handle when present
    async fn has(
        &self,
        bundle_name: &str,
        package: &str,
        version: &str,
        ecosystem: Ecosystem,
    ) -> PackdResult<Option<CacheHandle>>;

    /// Read a bundle previously located with `has`
    async fn get(&self, handle: &CacheHandle) -> PackdResult<BundleArtifact>;

    /// Store a bundle; a no-op if the bundle already exists
    async fn set(
        &self,
        bundle_name: &str,
        content: &[u8],
        package: &str,
        version: &str,
        ecosystem: Ecosystem,
    ) -> PackdResult<()>;
}

/// Relative location `{ecosystem}/{package...}/{version}/{bundle}`.
///
/// Scoped packages nest one level (`@scope/name`). Components that could
/// escape the store root are rejected.
fn relative_path(
    bundle_name: &str,
    package: &str,
    version: &str,
    ecosystem: Ecosystem,
) -> PackdResult<PathBuf> {
    let mut path = PathBuf::from(ecosystem.cache_dir());
    for part in package.split('/').chain([version, bundle_name]) {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => path.push(part),
            _ => {
                return Err(PackdError::User(format!(
                    "Refusing cache path component {:?} for {}@{}",
                    part, package, version
                )))
            }
        }
    }
    Ok(path)
}

/// Sidecar metadata written next to each bundle
#[derive(Debug, Serialize, Deserialize)]
struct BundleMeta {
    package: String,
    version: String,
    size: usize,
    created_at: DateTime<Utc>,
}

/// Bundle store on the local filesystem
pub struct FsCacheStore {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove every stored bundle
    /// Whether the cache root has been created
    pub async fn exists(&self) -> PackdResult<bool> {
        fs::try_exists(&self.root)
            .await
            .map_err(|e| PackdError::io(format!("checking {}", self.root.display()), e))
    }

    pub async fn clear(&self) -> PackdResult<()> {
        if !self.exists().await? {
            return Ok(());
        }
        fs::remove_dir_all(&self.root)
            .await
            .map_err(|e| PackdError::io(format!("removing cache {}", self.root.display()), e))?;
        debug!("Cleared cache at {}", self.root.display());
        Ok(())
    }

    fn meta_path(bundle: &Path) -> PathBuf {
        let mut name = bundle.as_os_str().to_owned();
        name.push(".meta.json");
        PathBuf::from(name)
    }

    async fn write_atomic(&self, target: &Path, content: &[u8]) -> PackdResult<()> {
        let seq = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = target.as_os_str().to_owned();
        tmp_name.push(format!(".tmp-{}-{}", std::process::id(), seq));
        let tmp = PathBuf::from(tmp_name);

        fs::write(&tmp, content)
            .await
            .map_err(|e| PackdError::io(format!("writing {}", tmp.display()), e))?;
        if let Err(e) = fs::rename(&tmp, target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(PackdError::io(format!("renaming into {}", target.display()), e));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FsCacheStore {
    async fn has(
        &self,
        bundle_name: &str,
        package: &str,
        version: &str,
        ecosystem: Ecosystem,
    ) -> PackdResult<Option<CacheHandle>> {
        let path = self
            .root
            .join(relative_path(bundle_name, package, version, ecosystem)?);
        let exists = fs::try_exists(&path)
            .await
            .map_err(|e| PackdError::io(format!("checking {}", path.display()), e))?;
        Ok(exists.then(|| CacheHandle(path)))
    }

    async fn get(&self, handle: &CacheHandle) -> PackdResult<BundleArtifact> {
        let path = handle.path();
        let raw_content = fs::read(path)
            .await
            .map_err(|e| PackdError::io(format!("reading bundle {}", path.display()), e))?;

        let created_at = match fs::read_to_string(Self::meta_path(path)).await {
            Ok(json) => serde_json::from_str::<BundleMeta>(&json)?.created_at,
            Err(_) => fs::metadata(path)
                .await
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
        };

        Ok(BundleArtifact {
            raw_content: Bytes::from(raw_content),
            created_at,
        })
    }

    async fn set(
        &self,
        bundle_name: &str,
        content: &[u8],
        package: &str,
        version: &str,
        ecosystem: Ecosystem,
    ) -> PackdResult<()> {
        let path = self
            .root
            .join(relative_path(bundle_name, package, version, ecosystem)?);
        let stored = fs::try_exists(&path)
            .await
            .map_err(|e| PackdError::io(format!("checking {}", path.display()), e))?;
        if stored {
            debug!("Bundle already stored: {}", path.display());
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PackdError::io(format!("creating {}", parent.display()), e))?;
        }

        let meta = BundleMeta {
            package: package.to_string(),
            version: version.to_string(),
            size: content.len(),
            created_at: Utc::now(),
        };
        // Sidecar first so a visible bundle always has its metadata
        self.write_atomic(&Self::meta_path(&path), serde_json::to_string_pretty(&meta)?.as_bytes())
            .await?;
        self.write_atomic(&path, content).await?;

        debug!("Stored {} bytes at {}", content.len(), path.display());
        Ok(())
    }
}

/// Bundle store held in process memory
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<PathBuf, BundleArtifact>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, BundleArtifact>> {
        // Entries are only ever inserted whole, so a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn has(
        &self,
        bundle_name: &str,
        package: &str,
        version: &str,
        ecosystem: Ecosystem,
    ) -> PackdResult<Option<CacheHandle>> {
        let path = relative_path(bundle_name, package, version, ecosystem)?;
        Ok(self.lock().contains_key(&path).then(|| CacheHandle(path)))
    }

    async fn get(&self, handle: &CacheHandle) -> PackdResult<BundleArtifact> {
        self.lock().get(handle.path()).cloned().ok_or_else(|| {
            PackdError::User(format!("Bundle vanished from cache: {}", handle.path().display()))
        })
    }

    async fn set(
        &self,
        bundle_name: &str,
        content: &[u8],
        package: &str,
        version: &str,
        ecosystem: Ecosystem,
    ) -> PackdResult<()> {
        let path = relative_path(bundle_name, package, version, ecosystem)?;
        self.lock().entry(path).or_insert_with(|| BundleArtifact {
            raw_content: Bytes::copy_from_slice(content),
            created_at: Utc::now(),
        });
        Ok(())
    }
}
