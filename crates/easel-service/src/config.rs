//! Configuration loader and validator for the easel service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub store: Store,
    pub repost: Repost,
}

/// Durable store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Store {
    /// SQLite database URL, e.g. `sqlite:///var/lib/easel/easel.db`.
    pub url: String,
    /// Per-operation deadline.
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
}

/// Repost detector settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repost {
    pub backend: RepostBackend,
    /// Required when `backend` is `redis`.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Expiry sweep interval for the memory backend.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Per-operation deadline for the redis backend.
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepostBackend {
    /// In-process map; single-instance deployments.
    Memory,
    /// Shared Redis namespace; multi-instance deployments.
    Redis,
}

fn default_op_timeout_secs() -> u64 {
    5
}

fn default_sweep_interval_secs() -> u64 {
    300
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.store.url.trim().is_empty() {
        return Err(ConfigError::Invalid("store.url must be non-empty"));
    }
    if cfg.store.op_timeout_secs == 0 {
        return Err(ConfigError::Invalid("store.op_timeout_secs must be > 0"));
    }

    if cfg.repost.backend == RepostBackend::Redis
        && cfg
            .repost
            .redis_url
            .as_deref()
            .is_none_or(|url| url.trim().is_empty())
    {
        return Err(ConfigError::Invalid(
            "repost.redis_url is required for the redis backend",
        ));
    }
    if cfg.repost.sweep_interval_secs == 0 {
        return Err(ConfigError::Invalid("repost.sweep_interval_secs must be > 0"));
    }
    if cfg.repost.op_timeout_secs == 0 {
        return Err(ConfigError::Invalid("repost.op_timeout_secs must be > 0"));
    }

    Ok(())
}

/// Example configuration document.
pub fn example() -> &'static str {
    r#"store:
  url: "sqlite://easel.db"
  op_timeout_secs: 5

repost:
  backend: memory
  # backend: redis
  # redis_url: "redis://127.0.0.1:6379"
  sweep_interval_secs: 300
"#
}
