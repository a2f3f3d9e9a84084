//! Configuration Module
//!
//! Provides TOML-based configuration for KnxBridge with support for:
//! - Gateway and group endpoint addresses
//! - Metrics exposition
//! - Shutdown grace period
//! - Environment variable overrides (KNXBRIDGE__* prefix)
//! - `${VAR}` / `${VAR:-default}` substitution inside the file

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;


/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Gateway tunnel endpoint
    pub gateway: BusEndpointConfig,
    /// Group/broadcast endpoint (multicast group or second gateway)
    pub group: GroupEndpointConfig,
    /// Metrics configuration
    pub metrics: MetricsConfig,
    /// Shutdown configuration
    pub shutdown: ShutdownConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// A bus endpoint reached over KNXnet/IP
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusEndpointConfig {
    /// Host name or IP address
    pub host: String,
    /// UDP port (KNXnet/IP default: 3671)
    pub port: u16,
}

impl Default for BusEndpointConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 3671,
        }
    }
}

impl BusEndpointConfig {
    /// Joined `host:port` form, as handed to the connector.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The other endpoint. Defaults to the standard KNXnet/IP routing group.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GroupEndpointConfig {
    /// Multicast group or unicast host
    pub host: String,
    /// UDP port
    pub port: u16,
}

impl Default for GroupEndpointConfig {
    fn default() -> Self {
        Self {
            host: "224.0.23.12".to_string(),
            port: 3671,
        }
    }
}

impl GroupEndpointConfig {
    /// Joined `host:port` form, as handed to the connector.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether the exposition endpoint is enabled
    pub enabled: bool,
    /// HTTP bind address for the metrics endpoint
    pub bind: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:9090".parse().unwrap(),
        }
    }
}

/// Shutdown configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Grace period for co-located service shutdown (e.g. "5s")
    #[serde(with = "humantime_serde")]
    pub grace: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, with env var substitution and
    /// `KNXBRIDGE__*` overrides. A missing file falls back to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("gateway.port", 3671)?
            .set_default("group.host", "224.0.23.12")?
            .set_default("group.port", 3671)?
            .set_default("metrics.enabled", true)?
            .set_default("metrics.bind", "0.0.0.0:9090")?
            .set_default("shutdown.grace", "5s")?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Override with environment variables (KNXBRIDGE__GATEWAY__HOST, etc.)
        // Double underscore separates nested keys, single underscore preserved
        let cfg = builder
            .add_source(
                Environment::with_prefix("KNXBRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file).
    ///
    /// Useful for containerized deployments where all config comes from env vars.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.host.is_empty() {
            return Err(ConfigError::Validation(
                "gateway.host must be set".to_string(),
            ));
        }

        if self.group.host.is_empty() {
            return Err(ConfigError::Validation("group.host must be set".to_string()));
        }

        if self.gateway.port == 0 || self.group.port == 0 {
            return Err(ConfigError::Validation(
                "endpoint ports must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// The gateway address string handed to the bridge factory.
    pub fn gateway_address(&self) -> String {
        self.gateway.address()
    }

    /// The other-side address string handed to the bridge factory.
    pub fn group_address(&self) -> String {
        self.group.address()
    }
}
