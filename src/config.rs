//! Configuration for the piano quiz caching worker and its host server.
//!
//! The worker's cache policy (version name, asset lists, audio host) is fixed
//! at compile time; [`WorkerConfig::default`] is built from the constants
//! below. The host server's knobs can be loaded from a JSON file.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use url::Url;

/// Name of the current cache version.
pub const CACHE_NAME: &str = "piano-quiz-v1";

/// App shell, resolved against the worker's origin.
pub const STATIC_ASSETS: &[&str] = &["./", "./index.html", "./manifest.json"];

/// Third-party libraries cached opportunistically at install.
pub const EXTERNAL_ASSETS: &[&str] = &[
    "https://unpkg.com/vexflow@4.2.5/build/cjs/vexflow.js",
    "https://cdnjs.cloudflare.com/ajax/libs/tone/15.0.4/Tone.js",
];

/// Requests to this host are served network-first.
pub const AUDIO_SAMPLE_HOST: &str = "tonejs.github.io";

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "piano-quiz-sw", about = "Offline caching proxy for the piano note quiz")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides the config file).
    #[arg(long)]
    pub listen: Option<String>,

    /// Origin of the quiz application (overrides the config file).
    #[arg(long)]
    pub origin: Option<Url>,

    /// Directory for the persistent cache store (overrides the config file).
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Serve from cache only; every network fetch fails.
    #[arg(long)]
    pub offline: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host server configuration.
    pub server: ServerConfig,

    /// Worker scope and origin.
    pub worker: WorkerConfig,

    /// Cache store backend.
    pub storage: StorageConfig,

    /// Outbound network settings.
    pub network: NetworkConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "127.0.0.1:8787").
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8787".to_string(),
        }
    }
}

/// Cache policy of the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Scope URL the worker is registered for. Its origin is the worker's
    /// own origin and static assets resolve against it.
    pub scope: Url,

    /// Current cache version name.
    pub cache_name: String,

    /// Same-origin app shell paths.
    pub static_assets: Vec<String>,

    /// Cross-origin library URLs.
    pub external_assets: Vec<String>,

    /// Host whose requests are served network-first.
    pub audio_sample_host: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scope: Url::parse("http://localhost:8000/").expect("static scope URL is valid"),
            cache_name: CACHE_NAME.to_string(),
            static_assets: STATIC_ASSETS.iter().map(|s| s.to_string()).collect(),
            external_assets: EXTERNAL_ASSETS.iter().map(|s| s.to_string()).collect(),
            audio_sample_host: AUDIO_SAMPLE_HOST.to_string(),
        }
    }
}

impl WorkerConfig {
    /// Default policy for a worker registered at `scope`.
    pub fn for_scope(scope: Url) -> Self {
        Self {
            scope,
            ..Default::default()
        }
    }

    /// Resolve the static asset list against the scope URL.
    pub fn static_asset_urls(&self) -> Result<Vec<Url>, url::ParseError> {
        self.static_assets
            .iter()
            .map(|path| self.scope.join(path))
            .collect()
    }

    /// Whether `url` is listed verbatim in the external asset list.
    pub fn is_external_asset(&self, url: &Url) -> bool {
        self.external_assets.iter().any(|asset| asset == url.as_str())
    }

    /// Whether `url` shares the worker's origin.
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.scope.origin()
    }
}

/// Which cache store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Disk,
}

/// Cache store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Root directory for the disk backend.
    pub path: PathBuf,

    /// Apply zstd compression to stored bodies.
    pub compress_bodies: bool,

    /// zstd compression level (1-22).
    pub zstd_level: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Disk,
            path: PathBuf::from("/tmp/piano-quiz-sw"),
            compress_bodies: true,
            zstd_level: 3,
        }
    }
}

/// Outbound network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// User agent sent upstream.
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            user_agent: format!("piano-quiz-sw/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply command-line overrides on top of the loaded file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(origin) = &cli.origin {
            self.worker.scope = origin.clone();
        }
        if let Some(dir) = &cli.storage_dir {
            self.storage.backend = StorageBackend::Disk;
            self.storage.path = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.worker.cache_name, "piano-quiz-v1");
        assert_eq!(cfg.worker.audio_sample_host, "tonejs.github.io");
        assert_eq!(cfg.worker.external_assets.len(), 2);
    }

    #[test]
    fn test_static_assets_resolve_against_scope() {
        let cfg = WorkerConfig::for_scope(Url::parse("https://quiz.example/app/").unwrap());
        let urls: Vec<String> = cfg
            .static_asset_urls()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://quiz.example/app/",
                "https://quiz.example/app/index.html",
                "https://quiz.example/app/manifest.json",
            ]
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"server": {"listen": "0.0.0.0:9000"}}"#).unwrap();
        assert_eq!(cfg.server.listen, "0.0.0.0:9000");
        assert_eq!(cfg.storage.zstd_level, 3);
        assert_eq!(cfg.worker.cache_name, CACHE_NAME);
    }

    #[test]
    fn test_origin_checks() {
        let cfg = WorkerConfig::default();
        assert!(cfg.is_same_origin(&Url::parse("http://localhost:8000/new-page").unwrap()));
        assert!(!cfg.is_same_origin(&Url::parse("http://localhost:9000/").unwrap()));
        assert!(cfg.is_external_asset(&Url::parse(EXTERNAL_ASSETS[1]).unwrap()));
    }
}
