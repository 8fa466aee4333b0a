use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_ENV: &str = "FLOWPROBE_CONFIG";

/// Environment variable overriding the listen address.
pub const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    /// Version string handlers stamp on their responses.
    pub response_version: String,
    /// Verdict reported by `/status`.
    pub healthy: bool,
    pub egress: EgressConfig,
}

/// Outbound buffering limits of one connection, in bytes.
///
/// Producers are paused once the queue reaches `high_watermark` and resumed
/// once it drains to `low_watermark`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EgressConfig {
    pub high_watermark: usize,
    pub low_watermark: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            response_version: "1.1".to_string(),
            healthy: true,
            egress: EgressConfig::default(),
        }
    }
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            high_watermark: 256 * 1024,
            low_watermark: 64 * 1024,
        }
    }
}

impl Config {
    /// Loads the config file named by `FLOWPROBE_CONFIG` (defaults when unset),
    /// then applies the `LISTEN` override.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        if let Ok(listen_addr) = std::env::var(LISTEN_ENV) {
            cfg.listen_addr = listen_addr;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parses and validates a YAML document. Missing fields take their defaults.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("listen_addr is empty".into()));
        }
        if self.response_version.trim().is_empty() {
            return Err(ConfigError::Invalid("response_version is empty".into()));
        }
        let egress = &self.egress;
        if egress.high_watermark == 0 {
            return Err(ConfigError::Invalid("egress.high_watermark must be positive".into()));
        }
        if egress.low_watermark >= egress.high_watermark {
            return Err(ConfigError::Invalid(format!(
                "egress.low_watermark ({}) must be below egress.high_watermark ({})",
                egress.low_watermark, egress.high_watermark
            )));
        }
        Ok(())
    }
}
