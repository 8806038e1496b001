//! Configuration module for hookrelay.
//!
//! Loads configuration from a TOML file with `${VAR}` environment variable
//! substitution, then applies environment overrides.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 7913
//!
//! [gateway]
//! url = "ws://127.0.0.1:18789"
//! source = "hookrelay"
//! reconnect_delay_secs = 5
//!
//! [github]
//! secret = "${GITHUB_WEBHOOK_SECRET}"
//!
//! [storage]
//! log_dir = "logs"
//! ```
//!
//! # Environment Overrides
//!
//! ```text
//! Variable                | Field
//! ------------------------|----------------
//! WEBHOOK_HOST            | server.host
//! WEBHOOK_PORT            | server.port
//! HOOKRELAY_GATEWAY_URL   | gateway.url
//! GITHUB_WEBHOOK_SECRET   | github.secret
//! HOOKRELAY_LOG_DIR       | storage.log_dir
//! ```

use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Config file used when `HOOKRELAY_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config/hookrelay.toml";

/// Environment variable name inside a `${...}` placeholder
const VAR_NAME: &str = r"[A-Za-z_][A-Za-z0-9_]*";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid substitution pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub github: GithubConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7913
}

/// Gateway connection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Value of the envelope `source` field
    #[serde(default = "default_source")]
    pub source: String,

    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            source: default_source(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

fn default_gateway_url() -> String {
    "ws://127.0.0.1:18789".to_string()
}

fn default_source() -> String {
    "hookrelay".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

/// GitHub webhook configuration. An empty secret disables verification.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GithubConfig {
    #[serde(default)]
    pub secret: String,
}

/// Storage configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl RelayConfig {
    /// Load configuration from `HOOKRELAY_CONFIG` (or the default path),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            env::var("HOOKRELAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path. A missing file yields defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        let content = substitute_env_vars(&content)?;

        debug!("Parsing TOML configuration");
        let mut config: RelayConfig = toml::from_str(&content)?;
        config.clear_placeholder_secret()?;
        config.validate()?;

        info!(
            port = config.server.port,
            gateway = %config.gateway.url,
            signature_verification = config.github_secret().is_some(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("WEBHOOK_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("WEBHOOK_PORT") {
            self.server.port = port.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("WEBHOOK_PORT '{}' is not a valid port", port))
            })?;
        }
        if let Some(url) = lookup("HOOKRELAY_GATEWAY_URL") {
            self.gateway.url = url;
        }
        if let Some(secret) = lookup("GITHUB_WEBHOOK_SECRET") {
            self.github.secret = secret;
        }
        if let Some(dir) = lookup("HOOKRELAY_LOG_DIR") {
            self.storage.log_dir = PathBuf::from(dir);
        }
        self.clear_placeholder_secret()
    }

    /// A secret that is exactly `${VAR}` was never substituted.
    fn clear_placeholder_secret(&mut self) -> Result<(), ConfigError> {
        let placeholder = Regex::new(&format!(r"^\$\{{{}\}}$", VAR_NAME))?;
        if placeholder.is_match(&self.github.secret) {
            warn!(
                placeholder = %self.github.secret,
                "GitHub secret is an unsubstituted environment variable, verification disabled"
            );
            self.github.secret.clear();
        }
        Ok(())
    }

    /// The configured GitHub secret, if signature verification is on.
    pub fn github_secret(&self) -> Option<&str> {
        Some(self.github.secret.as_str()).filter(|s| !s.is_empty())
    }

    /// `host:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be non-zero".to_string(),
            ));
        }

        // No TLS backend is compiled in.
        let url = &self.gateway.url;
        if !url.starts_with("ws://") {
            return Err(ConfigError::ValidationError(format!(
                "gateway.url '{}' must start with ws://",
                url
            )));
        }

        if self.gateway.source.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "gateway.source must not be empty".to_string(),
            ));
        }

        if self.storage.log_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.log_dir must not be empty".to_string(),
            ));
        }

        if self.github_secret().is_none() {
            warn!("No GitHub secret configured, signature verification disabled");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(&format!(r"\$\{{({})\}}", VAR_NAME))?;

    Ok(re
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                    caps[0].to_string()
                }
            }
        })
        .to_string())
}
