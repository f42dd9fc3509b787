//! # photon-core
//!
//! Shared ambient pieces for the photon RPC crates.
//!
//! Nothing in here touches sockets. The net and rpc crates receive these
//! values explicitly: a [`config::ServerConfig`] built once at process start
//! and a [`log::Logger`] sink handed to every component that wants to log.
//!
//! ## Modules
//!
//! - `env` - Environment variable helpers
//! - `log` - Log levels, the `LogSink` capability and the leveled macros
//! - `config` - Server configuration (defaults, env overrides, TOML file)

pub mod env;
pub mod log;
pub mod config;

// Re-exports for convenience
pub use config::{ConfigError, ServerConfig};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};
pub use log::{LogLevel, LogSink, Logger, NullSink, StderrSink, TracingSink};
