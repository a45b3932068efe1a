use std::env;
use std::path::PathBuf;

const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address (0.0.0.0 for LAN, 127.0.0.1 for localhost)
    pub bind_addr: String,
    /// Model artifact written by `eegnet fit` or an external trainer
    pub model_path: PathBuf,
    /// Serving pipeline configuration; the artifact's own when unset
    pub pipeline_config: Option<PathBuf>,
    /// Maximum request body size in bytes
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_addr: "0.0.0.0".to_string(),
            model_path: PathBuf::from("./models/eegnet_model.json"),
            pipeline_config: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (and `.env`, if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from a variable lookup; unset variables keep their defaults.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match var("EEGNET_PORT") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::InvalidPort(v))?,
            None => defaults.port,
        };

        let max_body_bytes = match var("EEGNET_MAX_BODY_BYTES") {
            Some(v) => {
                let bytes: usize = v.trim().parse().map_err(|_| {
                    ConfigError::InvalidValue(format!("EEGNET_MAX_BODY_BYTES='{}'", v))
                })?;
                if bytes == 0 {
                    return Err(ConfigError::InvalidValue(
                        "EEGNET_MAX_BODY_BYTES must be positive".to_string(),
                    ));
                }
                bytes
            }
            None => defaults.max_body_bytes,
        };

        Ok(Self {
            port,
            bind_addr: var("EEGNET_BIND_ADDR").unwrap_or(defaults.bind_addr),
            model_path: var("EEGNET_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            pipeline_config: var("EEGNET_PIPELINE_CONFIG")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            max_body_bytes,
        })
    }

    /// Get the full bind address (addr:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number: {0}")]
    InvalidPort(String),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ServerConfig::from_vars(lookup(&[])).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.model_path, PathBuf::from("./models/eegnet_model.json"));
        assert!(config.pipeline_config.is_none());
        assert_eq!(config.max_body_bytes, 8 * 1024 * 1024);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_vars(lookup(&[
            ("EEGNET_PORT", "9100"),
            ("EEGNET_BIND_ADDR", "127.0.0.1"),
            ("EEGNET_MODEL_PATH", "/srv/model.json"),
            ("EEGNET_PIPELINE_CONFIG", "/srv/pipeline.json"),
            ("EEGNET_MAX_BODY_BYTES", "1024"),
        ]))
        .unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:9100");
        assert_eq!(config.model_path, PathBuf::from("/srv/model.json"));
        assert_eq!(config.pipeline_config, Some(PathBuf::from("/srv/pipeline.json")));
        assert_eq!(config.max_body_bytes, 1024);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            ServerConfig::from_vars(lookup(&[("EEGNET_PORT", "eighty")])),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            ServerConfig::from_vars(lookup(&[("EEGNET_MAX_BODY_BYTES", "0")])),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
