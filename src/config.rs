//! # Configuration Module
//!
//! Structured access to the DHT and network settings of a burrow node.
//!
//! ## Features
//! - **Layered Loading**: Combines YAML file settings, environment variables (`.env`), and hardcoded defaults.
//! - **Serde Integration**: Uses `serde` for serialization/deserialization to/from YAML.
//! - **Partial Configuration**: Supports incomplete YAML files by providing defaults for missing fields.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

// --- Default Value Providers ---
// These functions provide default values for Serde when a field is missing in the YAML file.

fn d_k() -> usize {
    20
}
fn d_alpha() -> usize {
    3
}
fn d_max_rounds() -> usize {
    20
}
fn d_ping_to() -> f64 {
    5.0
}
fn d_req_to() -> f64 {
    10.0
}
fn d_lookup_to() -> f64 {
    30.0
}
fn d_host() -> String {
    "0.0.0.0".to_string()
}
fn d_port() -> u16 {
    8080
}
fn d_log_level() -> String {
    "INFO".to_string()
}

/// Kademlia parameters for the routing table and lookup coordinator.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DhtConfig {
    /// Number of contacts stored in each bucket (k-value).
    #[serde(default = "d_k")]
    pub k: usize,
    /// Concurrency parameter for network lookups.
    #[serde(default = "d_alpha")]
    pub alpha: usize,
    /// Hard cap on lookup rounds, guards against cyclic contact graphs.
    #[serde(default = "d_max_rounds")]
    pub max_rounds: usize,
    /// Timeout in seconds for PING requests.
    #[serde(default = "d_ping_to")]
    pub ping_timeout: f64,
    /// Timeout in seconds for FIND_NODE requests.
    #[serde(default = "d_req_to")]
    pub request_timeout: f64,
    /// Overall deadline in seconds for one lookup invocation.
    #[serde(default = "d_lookup_to")]
    pub lookup_timeout: f64,
}

impl Default for DhtConfig {
    fn default() -> Self {
        serde_yaml::from_str("{}").unwrap()
    }
}

/// Network-specific settings: listening address and the bootstrap entry point.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// The host IP address to bind the node's transport.
    #[serde(default = "d_host")]
    pub listen_host: String,
    /// The port number to listen on. Zero picks an ephemeral port.
    #[serde(default = "d_port")]
    pub listen_port: u16,
    /// Bootstrap node address ("1.2.3.4:8080"). None means this node
    /// is the designated bootstrap and skips the join sequence.
    #[serde(default)]
    pub bootstrap_node: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        serde_yaml::from_str("{}").unwrap()
    }
}

/// The master configuration object for a burrow node.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub dht: DhtConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    /// Global logging level ("DEBUG", "INFO", "WARN", "ERROR").
    #[serde(default = "d_log_level")]
    pub log_level: String,
    /// Optional path to the log file. If None, logs to stdout.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        serde_yaml::from_str("{}").unwrap()
    }
}

impl Config {
    /// Loads the configuration from a YAML file and environment variables.
    ///
    /// It first attempts to load `.env` variables, then reads the specified YAML file.
    /// Environment variables (like `LOG_LEVEL`) override settings found in the file.
    /// If no file is found, it uses internal defaults for all parameters.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Optional path to the YAML file. Defaults to `config.yaml`.
    pub fn from_file(config_path: Option<PathBuf>) -> Self {
        let _ = dotenvy::dotenv();

        let path = config_path.unwrap_or_else(|| PathBuf::from("config.yaml"));

        let mut config: Config = if path.exists() {
            let content = fs::read_to_string(path).unwrap_or_default();
            serde_yaml::from_str(&content).unwrap_or_default()
        } else {
            Config::default()
        };

        if let Ok(env_level) = env::var("LOG_LEVEL") {
            config.log_level = env_level;
        }

        config
    }

    /// Persists the current configuration state to a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the serialization fails or if the file cannot be written.
    pub fn to_file(&self, config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let yaml_content = serde_yaml::to_string(self)?;
        fs::write(config_path, yaml_content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_kademlia_parameters() {
        let config = Config::default();
        assert_eq!(config.dht.k, 20);
        assert_eq!(config.dht.alpha, 3);
        assert_eq!(config.network.listen_port, 8080);
        assert!(config.network.bootstrap_node.is_none());
    }

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_fields() {
        let config: Config =
            serde_yaml::from_str("dht:\n  alpha: 5\nnetwork:\n  listen_port: 9000\n").unwrap();
        assert_eq!(config.dht.alpha, 5);
        assert_eq!(config.dht.k, 20);
        assert_eq!(config.network.listen_port, 9000);
        assert_eq!(config.network.listen_host, "0.0.0.0");
    }
}
