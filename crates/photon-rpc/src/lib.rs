//! # photon-rpc
//!
//! Request/response RPC on top of photon-net.
//!
//! Every frame carries one postcard-encoded [`RpcEnvelope`]. The server side
//! is a [`ServiceRegistry`] plugged into `photon_net::Server` as its
//! dispatcher; [`RpcClient`] is a blocking caller for tools and tests.
//!
//! ## Modules
//!
//! - `envelope` - `RpcEnvelope`, `MessageType`
//! - `message` - serde messages behind the object-safe `DynMessage`
//! - `service` - the `Service` descriptor and `ServiceBuilder`
//! - `registry` - name lookup and request dispatch
//! - `server` - `RpcServer`
//! - `client` - `RpcClient`
//! - `error` - `RpcError` and wire `ErrorCode`s

pub mod client;
pub mod envelope;
pub mod error;
pub mod message;
pub mod registry;
pub mod server;
pub mod service;

pub use client::RpcClient;
pub use envelope::{MessageType, RpcEnvelope};
pub use error::{ErrorCode, Result, RpcError};
pub use message::{decode_message, encode_message, DynMessage, Message};
pub use registry::ServiceRegistry;
pub use server::RpcServer;
pub use service::{FnService, Service, ServiceBuilder};
