//! Configuration loading for the console service.
//!
//! The configuration lives in `colony-config.yaml` in the working
//! directory. Every section is optional and falls back to defaults.
//! Infrastructure settings can be overridden from the environment:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `COLONY_API_URL` | `api.url` |
//! | `COLONY_API_TOKEN` | `api.token` |
//! | `NATS_URL` | `transport.nats_url` |
//! | `OBSERVER_PORT` | `observer.port` |
//! | `COLONY_SIMULATE` | `activity.simulate` (`1`, `true`, `yes`, `on`) |

use std::path::Path;
use std::time::Duration;

use colony_observer::ServerConfig;
use colony_sync::{ActivityConfig, PollConfig};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override held an unusable value.
    #[error("invalid value for {name}: {message}")]
    Env {
        /// The environment variable.
        name: &'static str,
        /// What was wrong with it.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level console configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConsoleConfig {
    /// Resource API access.
    #[serde(default)]
    pub api: ApiConfig,

    /// Poll intervals per resource.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Activity feed tunables.
    #[serde(default)]
    pub activity: ActivityConfig,

    /// Push transport.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Observer server bind address.
    #[serde(default)]
    pub observer: ServerConfig,
}

impl ConsoleConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override settings from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Override settings from `lookup`, which maps a variable name to its
    /// value when set.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("COLONY_API_URL") {
            self.api.url = url;
        }
        if let Some(token) = lookup("COLONY_API_TOKEN") {
            self.api.token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(url) = lookup("NATS_URL") {
            self.transport.nats_url = url;
        }
        if let Some(port) = lookup("OBSERVER_PORT") {
            self.observer.port = port.trim().parse().map_err(|e| ConfigError::Env {
                name: "OBSERVER_PORT",
                message: format!("{port:?} is not a port: {e}"),
            })?;
        }
        if let Some(flag) = lookup("COLONY_SIMULATE") {
            self.activity.simulate = is_truthy(&flag);
        }
        Ok(())
    }
}

/// Whether an environment flag is switched on.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Resource API access settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the resource API.
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,

    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ApiConfig {
    /// Request timeout as a [`Duration`].
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            token: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Poll settings for each polled resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PollingConfig {
    /// Room listing.
    #[serde(default)]
    pub rooms: PollConfig,

    /// Worker listing.
    #[serde(default)]
    pub workers: PollConfig,
}

/// NATS push transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransportConfig {
    /// NATS server URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Subject prefix; the transport subscribes to `{prefix}.>`.
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl TransportConfig {
    /// The wildcard subject covering every push message.
    pub fn subject(&self) -> String {
        format!("{}.>", self.subject_prefix)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
            subject_prefix: default_subject_prefix(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_api_url() -> String {
    "http://localhost:3700".to_owned()
}

const fn default_timeout_ms() -> u64 {
    10_000
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}

fn default_subject_prefix() -> String {
    "colony".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use colony_sync::UnscopedRunPolicy;

    use super::*;

    fn parse_without_env(yaml: &str) -> ConsoleConfig {
        serde_yml::from_str(yaml).unwrap()
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn parse_empty_yaml() {
        let config = parse_without_env("{}");
        assert_eq!(config, ConsoleConfig::default());
        assert_eq!(config.api.url, "http://localhost:3700");
        assert_eq!(config.api.timeout(), Duration::from_secs(10));
        assert_eq!(config.polling.rooms.interval_ms, 5_000);
        assert_eq!(config.polling.workers.max_backoff_ms, 30_000);
        assert_eq!(config.activity.capacity, 20);
        assert_eq!(config.transport.subject(), "colony.>");
        assert_eq!(config.observer.port, 8080);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
api:
  url: https://colony.example.com
  token: secret
  timeout_ms: 2500
polling:
  rooms:
    interval_ms: 10000
  workers:
    interval_ms: 2000
    max_backoff_ms: 16000
activity:
  event_ttl_ms: 8000
  unscoped_runs: first_active_room
transport:
  nats_url: nats://nats:4222
  subject_prefix: hive
observer:
  host: 127.0.0.1
  port: 9090
";
        let config = parse_without_env(yaml);
        assert_eq!(config.api.token.as_deref(), Some("secret"));
        assert_eq!(config.api.timeout(), Duration::from_millis(2_500));
        assert_eq!(config.polling.rooms.interval_ms, 10_000);
        assert_eq!(config.polling.rooms.max_backoff_ms, 30_000);
        assert_eq!(config.polling.workers.max_backoff_ms, 16_000);
        assert_eq!(config.activity.event_ttl_ms, 8_000);
        assert_eq!(config.activity.ripple_ttl_ms, 1_200);
        assert_eq!(config.activity.unscoped_runs, UnscopedRunPolicy::FirstActiveRoom);
        assert_eq!(config.transport.subject(), "hive.>");
        assert_eq!(config.observer.host, "127.0.0.1");
        assert_eq!(config.observer.port, 9090);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result: Result<ConsoleConfig, _> = serde_yml::from_str("api: [not, a, map]");
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_replace_yaml_values() {
        let mut config = parse_without_env("api:\n  token: from-file\n");
        config
            .apply_overrides(env(&[
                ("COLONY_API_URL", "http://api:3700"),
                ("COLONY_API_TOKEN", ""),
                ("NATS_URL", "nats://other:4222"),
                ("OBSERVER_PORT", " 9191 "),
                ("COLONY_SIMULATE", "yes"),
            ]))
            .unwrap();

        assert_eq!(config.api.url, "http://api:3700");
        assert_eq!(config.api.token, None);
        assert_eq!(config.transport.nats_url, "nats://other:4222");
        assert_eq!(config.observer.port, 9191);
        assert!(config.activity.simulate);
    }

    #[test]
    fn unset_env_leaves_config_alone() {
        let mut config = parse_without_env("activity:\n  simulate: true\n");
        config.apply_overrides(env(&[])).unwrap();
        assert!(config.activity.simulate);
        assert_eq!(config.api.url, "http://localhost:3700");
    }

    #[test]
    fn bad_port_override_is_rejected() {
        let mut config = ConsoleConfig::default();
        let err = config
            .apply_overrides(env(&[("OBSERVER_PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "OBSERVER_PORT", .. }));
    }

    #[test]
    fn simulate_flag_values() {
        for on in ["1", "true", "TRUE", "yes", "On", " on "] {
            assert!(is_truthy(on), "{on}");
        }
        for off in ["0", "false", "no", "off", "", "enabled"] {
            assert!(!is_truthy(off), "{off}");
        }
    }
}
