//! Configuration for the sidecar.
//!
//! Values layer in increasing precedence: built-in defaults, JSON5 config
//! file, environment variables, CLI flags.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;
use zeno_common::LoggingConfig;

/// Environment variable overriding the bind address.
pub const HOST_ENV_VAR: &str = "ZENO_SIDECAR_HOST";

/// Environment variable overriding the bind port.
pub const PORT_ENV_VAR: &str = "ZENO_SIDECAR_PORT";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete sidecar configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SidecarConfig {
    /// Bind address settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Sampling cadence settings.
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the sidecar listens for its consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind (default: "127.0.0.1").
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind (default: 8765).
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8765
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Sampling cadence and GPU probe bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Milliseconds between pushed samples (default: 1000).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Upper bound on one external GPU tool invocation in milliseconds
    /// (default: 1000, capped at 1000 so a probe never stalls a cycle).
    #[serde(default = "default_gpu_tool_timeout_ms")]
    pub gpu_tool_timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_gpu_tool_timeout_ms() -> u64 {
    1000
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            gpu_tool_timeout_ms: default_gpu_tool_timeout_ms(),
        }
    }
}

/// Host/port overrides captured from the process environment.
///
/// Kept as plain optional strings so precedence resolution stays a pure
/// function and unit tests never touch the real environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub host: Option<String>,
    pub port: Option<String>,
}

impl EnvOverrides {
    /// Capture the sidecar's environment variables.
    pub fn from_process_env() -> Self {
        Self {
            host: std::env::var(HOST_ENV_VAR).ok(),
            port: std::env::var(PORT_ENV_VAR).ok(),
        }
    }
}

impl SidecarConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SidecarConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: SidecarConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Layer env and CLI values over the file/default config.
    ///
    /// Flags take precedence over env vars, env vars over the file.
    pub fn resolve(
        mut self,
        env: EnvOverrides,
        host: Option<String>,
        port: Option<u16>,
        log_level: Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(h) = env.host {
            self.server.host = h;
        }
        if let Some(p) = env.port {
            self.server.port = p.parse().map_err(|_| {
                ConfigError::Validation(format!("{} is not a valid port: {}", PORT_ENV_VAR, p))
            })?;
        }
        if let Some(h) = host {
            self.server.host = h;
        }
        if let Some(p) = port {
            self.server.port = p;
        }
        if let Some(level) = log_level {
            self.logging.level = level;
        }
        self.validate()?;
        Ok(self)
    }

    /// The resolved bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|_| {
                ConfigError::Validation(format!(
                    "Invalid bind address: {}:{}",
                    self.server.host, self.server.port
                ))
            })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling.interval_ms == 0 {
            return Err(ConfigError::Validation(
                "interval_ms must be > 0".to_string(),
            ));
        }

        if self.sampling.gpu_tool_timeout_ms == 0 || self.sampling.gpu_tool_timeout_ms > 1000 {
            return Err(ConfigError::Validation(
                "gpu_tool_timeout_ms must be between 1 and 1000".to_string(),
            ));
        }

        self.socket_addr()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = SidecarConfig::parse("{}").unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8765);
        assert_eq!(config.sampling.interval_ms, 1000);
        assert_eq!(config.sampling.gpu_tool_timeout_ms, 1000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            server: {
                host: "0.0.0.0",
                port: 9000,
            },
            sampling: {
                interval_ms: 500,
                gpu_tool_timeout_ms: 250,
            },
            logging: {
                level: "debug",
                format: "json",
            },
        }"#;

        let config = SidecarConfig::parse(json).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.sampling.interval_ms, 500);
        assert_eq!(config.sampling.gpu_tool_timeout_ms, 250);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_zero_interval() {
        let result = SidecarConfig::parse(r#"{ sampling: { interval_ms: 0 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_tool_timeout_bounds() {
        let result = SidecarConfig::parse(r#"{ sampling: { gpu_tool_timeout_ms: 0 } }"#);
        assert!(result.is_err());

        let result = SidecarConfig::parse(r#"{ sampling: { gpu_tool_timeout_ms: 2000 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_invalid_host() {
        let result = SidecarConfig::parse(r#"{ server: { host: "not an address" } }"#);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid bind address")
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let config = SidecarConfig::parse(r#"{ server: { port: 9000 } }"#).unwrap();
        let env = EnvOverrides {
            host: Some("0.0.0.0".to_string()),
            port: Some("9100".to_string()),
        };

        let config = config.resolve(env, None, None, None).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn test_flags_override_env() {
        let env = EnvOverrides {
            host: Some("0.0.0.0".to_string()),
            port: Some("9100".to_string()),
        };

        let config = SidecarConfig::default()
            .resolve(env, Some("127.0.0.1".to_string()), Some(9200), None)
            .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9200);
    }

    #[test]
    fn test_non_numeric_env_port_rejected() {
        let env = EnvOverrides {
            host: None,
            port: Some("not-a-port".to_string()),
        };

        let result = SidecarConfig::default().resolve(env, None, None, None);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains(PORT_ENV_VAR));
    }

    #[test]
    fn test_log_level_flag_overrides_file() {
        let config = SidecarConfig::parse(r#"{ logging: { level: "warn" } }"#)
            .unwrap()
            .resolve(EnvOverrides::default(), None, None, Some("trace".to_string()))
            .unwrap();

        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_socket_addr() {
        let config = SidecarConfig::default();
        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:8765");
    }
}
