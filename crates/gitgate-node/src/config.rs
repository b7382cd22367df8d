//! Node configuration types.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid YAML for [`Config`].
    #[error("invalid config file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Access list file is not valid JSON.
    #[error("invalid access list {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value failed validation.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Configuration for the gitgate node.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// Base URL requests are forwarded to.
    pub upstream: String,
    /// Path prefix stripped before forwarding, e.g. `/github.com/`.
    pub route_prefix: String,
    /// Repository access list (JSON).
    pub access_list: PathBuf,
    /// Log level.
    pub log_level: String,
    /// Log format, `pretty` or `json`.
    pub log_format: String,
    /// Largest push body buffered for decoding.
    pub max_push_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            upstream: "https://github.com".to_string(),
            route_prefix: "/github.com/".to_string(),
            access_list: PathBuf::from("whitelist.json"),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            max_push_body_bytes: 256 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Loads configuration from a YAML file. Missing keys take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(?path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let upstream = reqwest::Url::parse(&self.upstream)
            .map_err(|e| ConfigError::Invalid(format!("upstream {:?}: {}", self.upstream, e)))?;
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "upstream scheme must be http or https: {}",
                self.upstream
            )));
        }

        if !self.route_prefix.starts_with('/') || !self.route_prefix.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "route_prefix must start and end with '/': {:?}",
                self.route_prefix
            )));
        }

        Ok(())
    }
}
