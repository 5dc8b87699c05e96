//! Configuration schema for packd
//!
//! Configuration is stored at `~/.config/packd/config.toml`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// HTTP listener settings
    pub server: ServerConfig,

    /// Package registry settings
    pub registry: RegistryConfig,

    /// Bundle cache settings
    pub cache: CacheConfig,

    /// External bundler settings
    pub build: BuildConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,

    /// Extra headers sent with every successful bundle response
    pub additional_headers: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut additional_headers = BTreeMap::new();
        additional_headers.insert(
            "Cache-Control".to_string(),
            "public, max-age=31536000, immutable".to_string(),
        );
        Self {
            bind: "127.0.0.1:8080".to_string(),
            additional_headers,
        }
    }
}

/// Package registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the npm-compatible registry
    pub url: String,

    /// Metadata request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "https://registry.npmjs.org".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Cache store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Bundles written under `cache.dir`
    #[default]
    Fs,
    /// Bundles held in process memory, lost on restart
    Memory,
}

/// Cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Storage backend
    pub backend: CacheBackend,

    /// Root directory for the fs backend (default: platform cache dir)
    pub dir: Option<PathBuf>,
}

/// External bundler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Program and arguments invoked once per bundle build
    pub command: Vec<String>,

    /// Maximum build duration in seconds (0 = unbounded)
    pub timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: vec![],
            timeout_secs: 120,
        }
    }
}
