//! ShopSync reference server
//!
//! An in-memory remote service for the repair-shop sync engine: record
//! collections plus per-entity edit locks.
//!
//! # Configuration
//!
//! Environment variables:
//! - `SHOPSYNC_PORT`: Port to listen on (default: 8080)
//! - `SHOPSYNC_SERVER_CONFIG`: Path to config file (default: ~/.config/shopsync-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     name: "front-desk"
//! ```
//!
//! Without any API key the service accepts unauthenticated requests.

use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shopsync::server::{router, RemoteStore};

/// API key entry in config
#[derive(Debug, Clone, Deserialize)]
struct ApiKeyEntry {
    key: String,
    #[serde(default)]
    name: Option<String>,
}

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    port: u16,
    config_path: PathBuf,
}

impl Config {
    fn from_env() -> Self {
        let port = std::env::var("SHOPSYNC_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let config_path = std::env::var("SHOPSYNC_SERVER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("shopsync-server")
                    .join("config.yaml")
            });

        Self { port, config_path }
    }
}

fn load_api_keys(config_path: &Path) -> HashSet<String> {
    let contents = match std::fs::read_to_string(config_path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!(
                "Failed to read config file {}: {}",
                config_path.display(),
                e
            );
            tracing::warn!("No API keys loaded - authentication is disabled");
            return HashSet::new();
        }
    };

    match serde_yaml::from_str::<ConfigFile>(&contents) {
        Ok(config) => {
            for entry in &config.api_keys {
                if let Some(name) = &entry.name {
                    tracing::debug!("Accepting API key '{}'", name);
                }
            }
            let keys: HashSet<String> = config.api_keys.into_iter().map(|e| e.key).collect();
            tracing::info!("Loaded {} API key(s)", keys.len());
            keys
        }
        Err(e) => {
            tracing::warn!("Failed to parse config file: {}", e);
            HashSet::new()
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopsync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!("Config file: {}", config.config_path.display());

    let api_keys = load_api_keys(&config.config_path);
    let app = router(Arc::new(RemoteStore::new()), api_keys);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
