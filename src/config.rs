use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/messenger.json";
pub const DEFAULT_DATABASE_PATH: &str = "data/messenger.db";
pub const DEFAULT_LISTEN_ADDRESS: &str = "/ip4/0.0.0.0/tcp/0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Multiaddrs ending in `/p2p/<PeerId>`, used to seed Kademlia.
    #[serde(default)]
    pub bootstrap_nodes: Vec<String>,
    #[serde(default = "default_true")]
    pub enable_mdns: bool,
    #[serde(default = "default_idle_timeout")]
    pub idle_connection_timeout_secs: u64,
}

fn default_database_path() -> String {
    DEFAULT_DATABASE_PATH.to_string()
}

fn default_listen_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}

fn default_true() -> bool {
    true
}

fn default_idle_timeout() -> u64 {
    300
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            listen_address: default_listen_address(),
            bootstrap_nodes: Vec::new(),
            enable_mdns: true,
            idle_connection_timeout_secs: default_idle_timeout(),
        }
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => parse_config(&content).unwrap_or_else(|err| {
            log::warn!("Failed to parse config file {}: {err}", path.display());
            AppConfig::default()
        }),
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

fn parse_config(content: &str) -> serde_json::Result<AppConfig> {
    serde_json::from_str::<AppConfig>(content)
}

/// Create the parent directory of the database file if needed.
pub fn ensure_parent_dir(path: &str) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
