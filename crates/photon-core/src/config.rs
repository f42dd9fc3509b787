//! Server configuration
//!
//! Built once at process start, then passed by reference to the acceptor
//! and the server. Nothing reads it again after the listening socket is
//! bound.
//!
//! # Configuration priority (highest wins)
//!
//! 1. Environment variables (`from_env`)
//! 2. Config file (`from_toml_file`)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use photon_core::config::ServerConfig;
//!
//! let config = ServerConfig::from_toml_file("conf/photon.toml")?
//!     .with_env_overrides()
//!     .port(9000);
//! config.validate()?;
//! ```
//!
//! The file format mirrors the two sections the server cares about:
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 12345
//! backlog = 64
//!
//! [log]
//! level = "debug"
//! flush = true
//! ```

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::env::{env_get, env_get_opt};
use crate::log::{LogLevel, Logger, StderrSink};

pub mod defaults {
    use crate::log::LogLevel;

    pub const HOST: &str = "127.0.0.1";
    pub const PORT: u16 = 12345;
    pub const BACKLOG: i32 = 64;
    pub const LOG_LEVEL: LogLevel = LogLevel::Info;
    pub const LOG_FLUSH: bool = false;
}

/// Listen address plus logging knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// IPv4 literal to bind (`0.0.0.0` for all interfaces)
    pub host: String,
    /// TCP port; 0 picks an ephemeral port
    pub port: u16,
    /// `listen(2)` backlog
    pub backlog: i32,
    /// Ceiling for the default stderr sink
    pub log_level: LogLevel,
    /// Flush stderr after every log line
    pub log_flush: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Library defaults, no environment lookup.
    pub fn new() -> Self {
        Self {
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            backlog: defaults::BACKLOG,
            log_level: defaults::LOG_LEVEL,
            log_flush: defaults::LOG_FLUSH,
        }
    }

    /// Defaults with environment overrides applied.
    ///
    /// Environment variables (all optional):
    /// - `PHOTON_HOST` - Listen address
    /// - `PHOTON_PORT` - Listen port
    /// - `PHOTON_BACKLOG` - listen(2) backlog
    /// - `PHOTON_LOG_LEVEL` - off|error|warn|info|debug|trace or 0-5
    /// - `PHOTON_LOG_FLUSH` - Flush after each log line (0/1)
    pub fn from_env() -> Self {
        Self::new().with_env_overrides()
    }

    /// Apply `PHOTON_*` overrides on top of `self`.
    pub fn with_env_overrides(self) -> Self {
        Self {
            host: env_get_opt("PHOTON_HOST").unwrap_or(self.host),
            port: env_get("PHOTON_PORT", self.port),
            backlog: env_get("PHOTON_BACKLOG", self.backlog),
            log_level: env_get("PHOTON_LOG_LEVEL", self.log_level),
            log_flush: env_get_opt::<String>("PHOTON_LOG_FLUSH")
                .map(|v| crate::env::parse_bool(&v))
                .unwrap_or(self.log_flush),
        }
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        Ok(file.apply(Self::new()))
    }

    /// Read and parse a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    // Builder methods

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn log_flush(mut self, flush: bool) -> Self {
        self.log_flush = flush;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue("host must not be empty"));
        }
        if self.host.trim().parse::<Ipv4Addr>().is_err() {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }
        if self.backlog <= 0 {
            return Err(ConfigError::InvalidValue("backlog must be > 0"));
        }
        Ok(())
    }

    /// The validated IPv4 socket address to bind or connect to.
    pub fn socket_addr(&self) -> Result<SocketAddrV4, ConfigError> {
        self.validate()?;
        let ip: Ipv4Addr = self
            .host
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.host.clone()))?;
        Ok(SocketAddrV4::new(ip, self.port))
    }

    /// Stderr sink honouring `log_level` / `log_flush`.
    pub fn stderr_logger(&self) -> Logger {
        StderrSink::new(self.log_level)
            .with_flush(self.log_flush)
            .into_logger()
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("Photon Configuration:");
        eprintln!("  host:       {}", self.host);
        eprintln!("  port:       {}", self.port);
        eprintln!("  backlog:    {}", self.backlog);
        eprintln!("  log_level:  {}", self.log_level);
        eprintln!("  log_flush:  {}", self.log_flush);
    }
}

/// On-disk shape; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    log: LogSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerSection {
    host: Option<String>,
    port: Option<u16>,
    backlog: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogSection {
    level: Option<LogLevel>,
    flush: Option<bool>,
}

impl ConfigFile {
    fn apply(self, base: ServerConfig) -> ServerConfig {
        ServerConfig {
            host: self.server.host.unwrap_or(base.host),
            port: self.server.port.unwrap_or(base.port),
            backlog: self.server.backlog.unwrap_or(base.backlog),
            log_level: self.log.level.unwrap_or(base.log_level),
            log_flush: self.log.flush.unwrap_or(base.log_flush),
        }
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidValue(&'static str),

    #[error("invalid config: host {0:?} is not an IPv4 address")]
    InvalidHost(String),

    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ServerConfig::new();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 12345);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.socket_addr().unwrap(),
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 12345)
        );
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new()
            .host("0.0.0.0")
            .port(0)
            .backlog(128)
            .log_level(LogLevel::Debug);

        assert_eq!(config.port, 0);
        assert_eq!(config.backlog, 128);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.socket_addr().unwrap().ip(), &Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn test_validation() {
        assert!(ServerConfig::new().host("").validate().is_err());
        assert!(matches!(
            ServerConfig::new().host("localhost").validate(),
            Err(ConfigError::InvalidHost(_))
        ));
        assert!(ServerConfig::new().backlog(0).validate().is_err());
    }

    #[test]
    fn test_toml_sections() {
        let text = r#"
            [server]
            host = "10.0.0.1"
            port = 9000

            [log]
            level = "trace"
            flush = true
        "#;
        let config = ServerConfig::from_toml_str(text).unwrap();
        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.backlog, defaults::BACKLOG);
        assert_eq!(config.log_level, LogLevel::Trace);
        assert!(config.log_flush);
    }

    #[test]
    fn test_toml_empty_is_defaults() {
        assert_eq!(ServerConfig::from_toml_str("").unwrap(), ServerConfig::new());
    }

    #[test]
    fn test_toml_rejects_garbage() {
        assert!(matches!(
            ServerConfig::from_toml_str("[server]\nport = \"eighty\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(ServerConfig::from_toml_str("[server]\nhots = \"x\"").is_err());
        assert!(ServerConfig::from_toml_str("[log]\nlevel = \"loud\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = ServerConfig::from_toml_file("/nonexistent/photon.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
