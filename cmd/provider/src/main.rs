//! Photon demo provider
//!
//! Serves `CalculateService` (Add, Sub) and `EchoService` (Echo) until
//! SIGINT/SIGTERM.
//!
//! Usage:
//!     cargo build --release -p photon-provider
//!     ./target/release/provider [port]
//!
//! Environment:
//!     PHOTON_CONFIG=photon.toml   read `[server]` / `[log]` from a file first
//!     PHOTON_HOST, PHOTON_PORT, PHOTON_BACKLOG, PHOTON_LOG_LEVEL, PHOTON_LOG_FLUSH
//!     PHOTON_LOG_SINK=tracing     log through tracing-subscriber (RUST_LOG filter)

use photon_core::config::ServerConfig;
use photon_core::env::{env_get_opt, env_get_str};
use photon_core::log::{Logger, TracingSink};
use photon_rpc::{FnService, RpcServer, ServiceBuilder};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CalculateRequest {
    a: i64,
    b: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CalculateResponse {
    result: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EchoMessage {
    sentence: String,
}

fn calculate_service() -> FnService {
    ServiceBuilder::new("CalculateService")
        .method("Add", |req: &CalculateRequest| CalculateResponse {
            result: req.a.wrapping_add(req.b),
        })
        .method("Sub", |req: &CalculateRequest| CalculateResponse {
            result: req.a.wrapping_sub(req.b),
        })
        .build()
}

fn echo_service() -> FnService {
    ServiceBuilder::new("EchoService")
        .method("Echo", |req: &EchoMessage| EchoMessage {
            sentence: req.sentence.clone(),
        })
        .build()
}

fn load_config() -> Result<ServerConfig, photon_core::ConfigError> {
    let config = match env_get_opt::<String>("PHOTON_CONFIG") {
        Some(path) => ServerConfig::from_toml_file(path)?.with_env_overrides(),
        None => ServerConfig::from_env(),
    };
    let port = std::env::args().nth(1).and_then(|s| s.parse().ok());
    Ok(match port {
        Some(port) => config.port(port),
        None => config,
    })
}

fn make_logger(config: &ServerConfig) -> Logger {
    if env_get_str("PHOTON_LOG_SINK", "stderr") != "tracing" {
        return config.stderr_logger();
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    TracingSink::new(config.log_level).into_logger()
}

fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("provider: {}", e);
            std::process::exit(1);
        }
    };
    if env_get_str("PHOTON_PRINT_CONFIG", "0") == "1" {
        config.print();
    }

    let log = make_logger(&config);
    let mut server = match RpcServer::new(&config, log) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("provider: cannot start on {}:{}: {}", config.host, config.port, e);
            std::process::exit(1);
        }
    };
    server.add(calculate_service());
    server.add(echo_service());

    if let Err(e) = server.install_signal_handlers() {
        eprintln!("provider: {}", e);
        std::process::exit(1);
    }

    eprintln!(
        "provider: listening on {} ({})",
        server.local_addr(),
        server.registry().service_names().join(", ")
    );
    let reason = server.run();
    eprintln!("provider: stopped ({:?})", reason);
}
