//! Server configuration
//!
//! Layered in order: defaults, an optional TOML file, `LOGLINE_*`
//! environment variables, then command-line flags.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use logline_logging::LogConfig;
use logline_service::ServiceConfig;
use logline_storage::RepositoryConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_HTTP_ADDR: &str = "LOGLINE_HTTP_ADDR";
pub const ENV_LOG_LEVEL: &str = "LOGLINE_LOG_LEVEL";
pub const ENV_CONFLICT_POLICY: &str = "LOGLINE_CONFLICT_POLICY";
pub const ENV_CALL_TIMEOUT_MS: &str = "LOGLINE_CALL_TIMEOUT_MS";

/// Default listen address
pub const DEFAULT_HTTP_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 9090);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value {value:?} for {name}: {reason}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address
    pub http_addr: SocketAddr,
    pub repository: RepositoryConfig,
    pub service: ServiceConfig,
    pub logging: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR,
            repository: RepositoryConfig::default(),
            service: ServiceConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file, or the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `LOGLINE_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_HTTP_ADDR) {
            self.http_addr = parse_env(ENV_HTTP_ADDR, value)?;
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.logging.default_level = value;
        }
        if let Some(value) = lookup(ENV_CONFLICT_POLICY) {
            self.repository.conflict_policy = parse_env(ENV_CONFLICT_POLICY, value)?;
        }
        if let Some(value) = lookup(ENV_CALL_TIMEOUT_MS) {
            self.service.call_timeout_ms = parse_env(ENV_CALL_TIMEOUT_MS, value)?;
        }
        Ok(())
    }

    /// Apply command-line overrides
    pub fn apply_flags(&mut self, http_addr: Option<SocketAddr>, log_level: Option<String>) {
        if let Some(addr) = http_addr {
            self.http_addr = addr;
        }
        if let Some(level) = log_level {
            self.logging.default_level = level;
        }
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn parse_env<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value.trim().parse() {
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(ConfigError::InvalidEnv {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logline_storage::ConflictPolicy;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, DEFAULT_HTTP_ADDR);
        assert_eq!(config.http_addr.to_string(), "0.0.0.0:9090");
        assert_eq!(config.repository.conflict_policy, ConflictPolicy::FallbackToUpdate);
        assert_eq!(config.service.call_timeout_ms, 1_000);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        assert_eq!(ServerConfig::load(None).unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            http_addr = "127.0.0.1:7000"

            [repository.conflict_policy]
            kind = "retry_counter_race"
            max_retries = 4

            [logging]
            default_level = "debug"
            "#
        )
        .unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.http_addr.port(), 7000);
        assert_eq!(
            config.repository.conflict_policy,
            ConflictPolicy::RetryCounterRace { max_retries: 4 }
        );
        assert_eq!(config.logging.default_level, "debug");
        assert_eq!(config.service, ServiceConfig::default());
    }

    #[test]
    fn test_load_reports_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "http_addr = 12").unwrap();
        let err = ServerConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let err = ServerConfig::load(Some(Path::new("/nonexistent/logline.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        config
            .apply_overrides(lookup(&[
                (ENV_HTTP_ADDR, "127.0.0.1:8080"),
                (ENV_LOG_LEVEL, "warn"),
                (ENV_CONFLICT_POLICY, "retry_counter_race:2"),
                (ENV_CALL_TIMEOUT_MS, "250"),
            ]))
            .unwrap();

        assert_eq!(config.http_addr.port(), 8080);
        assert_eq!(config.logging.default_level, "warn");
        assert_eq!(
            config.repository.conflict_policy,
            ConflictPolicy::RetryCounterRace { max_retries: 2 }
        );
        assert_eq!(config.service.call_timeout_ms, 250);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_overrides(lookup(&[(ENV_CALL_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: ENV_CALL_TIMEOUT_MS,
                ..
            }
        ));
    }

    #[test]
    fn test_flags_win_over_env() {
        let mut config = ServerConfig::default();
        config
            .apply_overrides(lookup(&[(ENV_LOG_LEVEL, "warn")]))
            .unwrap();
        config.apply_flags(Some("127.0.0.1:1".parse().unwrap()), Some("trace".into()));

        assert_eq!(config.logging.default_level, "trace");
        assert_eq!(config.http_addr.port(), 1);
    }

    #[test]
    fn test_rendered_config_loads_back() {
        let mut config = ServerConfig::default();
        config.repository.conflict_policy = ConflictPolicy::RetryCounterRace { max_retries: 3 };

        let rendered = config.to_toml().unwrap();
        let parsed: ServerConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
