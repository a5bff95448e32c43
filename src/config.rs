//! Dashboard configuration.
//!
//! Loaded once at startup from an optional TOML file under the platform
//! config directory, then overridden by the `MQTT_BROKER` / `MQTT_PORT`
//! environment variables the bridge deployment already uses. Missing or
//! malformed files degrade to defaults rather than preventing startup,
//! so the dashboard always comes up.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::state::history::DEFAULT_WINDOW_SECS;

/// Broker endpoint and session parameters.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "carhud".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 5,
        }
    }
}

/// The two fixed topics of the bridge contract.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TopicConfig {
    /// Inbound vehicle telemetry.
    pub telemetry: String,
    /// Outbound command envelopes.
    pub commands: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            telemetry: "car/data".to_string(),
            commands: "car/commands".to_string(),
        }
    }
}

/// Retention settings for derived history series.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub engine_load_window_secs: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            engine_load_window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct DashConfig {
    pub broker: BrokerConfig,
    pub topics: TopicConfig,
    pub history: HistoryConfig,
}

impl DashConfig {
    /// Loads configuration: defaults, then the TOML file if present,
    /// then environment overrides.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("no config file, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        info!(
            broker = %config.broker.host,
            port = config.broker.port,
            telemetry = %config.topics.telemetry,
            "configuration loaded"
        );
        config
    }

    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("carhud").join("config.toml"))
    }

    fn from_file(path: &PathBuf) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!(
                        "config file {} is malformed, using defaults: {}",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!(
                    "config file {} unreadable, using defaults: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = env::var("MQTT_BROKER") {
            if !host.is_empty() {
                self.broker.host = host;
            }
        }
        if let Ok(port) = env::var("MQTT_PORT") {
            match port.parse() {
                Ok(port) => self.broker.port = port,
                Err(_) => warn!("ignoring non-numeric MQTT_PORT: {}", port),
            }
        }
    }

    /// Engine-load retention window as a chrono duration.
    pub fn history_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.history.engine_load_window_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_bridge_contract() {
        let config = DashConfig::default();
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.topics.telemetry, "car/data");
        assert_eq!(config.topics.commands, "car/commands");
        assert_eq!(config.history.engine_load_window_secs, 60);
    }

    #[test]
    fn partial_toml_keeps_defaults_elsewhere() {
        let config: DashConfig =
            toml::from_str("[broker]\nhost = \"garage-pi\"\nport = 1884\n").unwrap();
        assert_eq!(config.broker.host, "garage-pi");
        assert_eq!(config.broker.port, 1884);
        assert_eq!(config.broker.client_id, "carhud");
        assert_eq!(config.topics.telemetry, "car/data");
    }

    #[test]
    fn env_overrides_win() {
        let mut config = DashConfig::default();
        env::set_var("MQTT_BROKER", "test-broker");
        env::set_var("MQTT_PORT", "2883");
        config.apply_env_overrides();
        env::remove_var("MQTT_BROKER");
        env::remove_var("MQTT_PORT");

        assert_eq!(config.broker.host, "test-broker");
        assert_eq!(config.broker.port, 2883);
    }

    #[test]
    fn history_window_never_collapses() {
        let config = DashConfig {
            history: HistoryConfig {
                engine_load_window_secs: 0,
            },
            ..DashConfig::default()
        };
        assert_eq!(config.history_window(), chrono::Duration::seconds(1));
    }
}
