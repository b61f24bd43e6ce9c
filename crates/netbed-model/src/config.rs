//! The `netbed.toml` configuration file.
//!
//! Every section is optional; defaults reproduce the conventional single-host
//! deployment (router container named `router`, `nb-client:latest` image,
//! `nb_` managed-name prefix, five sync workers).

use crate::ModelError;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Root directory of the record store.
    #[serde(default = "default_store_root")]
    pub root: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Runtime backend name: "docker" or "mock".
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Name of the shared router container.
    #[serde(default = "default_router")]
    pub router_container: String,
    /// Image used for device containers.
    #[serde(default = "default_image")]
    pub client_image: String,
    /// Name prefix marking containers/networks as managed by netbed.
    #[serde(default = "default_prefix")]
    pub name_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            router_container: default_router(),
            client_image: default_image(),
            name_prefix: default_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Concurrent create/destroy workers per sync.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Interface discovery attempts before giving up.
    #[serde(default = "default_discovery_attempts")]
    pub discovery_attempts: u32,
    /// Delay between discovery attempts, in milliseconds.
    #[serde(default = "default_discovery_delay_ms")]
    pub discovery_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            discovery_attempts: default_discovery_attempts(),
            discovery_delay_ms: default_discovery_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_store_root() -> String {
    "./netbed-data".to_owned()
}

fn default_backend() -> String {
    "docker".to_owned()
}

fn default_router() -> String {
    "router".to_owned()
}

fn default_image() -> String {
    "nb-client:latest".to_owned()
}

fn default_prefix() -> String {
    "nb_".to_owned()
}

fn default_workers() -> usize {
    5
}

fn default_discovery_attempts() -> u32 {
    3
}

fn default_discovery_delay_ms() -> u64 {
    500
}

fn default_listen() -> String {
    "127.0.0.1:8420".to_owned()
}

/// Parse a configuration from TOML text.
pub fn parse_config_str(text: &str) -> Result<Config, ModelError> {
    Ok(toml::from_str(text)?)
}

/// Parse a configuration file; a missing file yields the defaults.
pub fn parse_config_file(path: &Path) -> Result<Config, ModelError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)?;
    parse_config_str(&text)
}
