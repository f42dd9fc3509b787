//! Photon demo consumer
//!
//! Calls `CalculateService.Add`, `CalculateService.Sub` and
//! `EchoService.Echo` on a running provider and prints the results.
//!
//! Usage:
//!     ./target/release/consumer [port] [a] [b] [sentence]
//!
//! The provider address comes from the same `PHOTON_*` environment as the
//! provider (or `PHOTON_CONFIG`).

use std::time::Duration;

use photon_core::config::ServerConfig;
use photon_core::env::env_get_opt;
use photon_rpc::{RpcClient, RpcError};
use serde::{Deserialize, Serialize};

// Wire shapes shared with the provider.

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

fn run(config: &ServerConfig, a: i64, b: i64, sentence: String) -> Result<(), RpcError> {
    let mut client = RpcClient::from_config(config)?;
    client.set_timeout(Some(Duration::from_secs(5)))?;

    let req = CalculateRequest { a, b };
    let sum: CalculateResponse = client.call("CalculateService", "Add", &req)?;
    println!("{} + {} = {}", a, b, sum.result);

    let diff: CalculateResponse = client.call("CalculateService", "Sub", &req)?;
    println!("{} - {} = {}", a, b, diff.result);

    let echo: EchoMessage = client.call("EchoService", "Echo", &EchoMessage { sentence })?;
    println!("echo: {}", echo.sentence);
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let config = match env_get_opt::<String>("PHOTON_CONFIG") {
        Some(path) => ServerConfig::from_toml_file(path).map(ServerConfig::with_env_overrides),
        None => Ok(ServerConfig::from_env()),
    };
    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("consumer: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(port) = args.get(1).and_then(|s| s.parse().ok()) {
        config = config.port(port);
    }
    let a: i64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(5);
    let b: i64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(3);
    let sentence = args.get(4).cloned().unwrap_or_else(|| "hello photon".to_string());

    if let Err(e) = run(&config, a, b, sentence) {
        eprintln!("consumer: {}:{}: {}", config.host, config.port, e);
        std::process::exit(1);
    }
}
