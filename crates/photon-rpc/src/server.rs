//! `RpcServer`: a photon-net `Server` whose dispatcher is a `ServiceRegistry`.

use std::net::SocketAddr;

use photon_core::config::ServerConfig;
use photon_core::log::Logger;
use photon_net::{Server, StopReason, Waker};

use crate::error::Result;
use crate::registry::ServiceRegistry;
use crate::service::Service;

pub struct RpcServer {
    inner: Server<ServiceRegistry>,
}

impl RpcServer {
    /// Bind and start listening. Services can be added until `run`.
    pub fn new(config: &ServerConfig, log: Logger) -> Result<Self> {
        let registry = ServiceRegistry::new(log.clone());
        let inner = Server::new(config, registry, log)?;
        Ok(Self { inner })
    }

    pub fn register(&mut self, name: impl Into<String>, service: Box<dyn Service>) {
        self.inner.dispatcher_mut().register(name, service);
    }

    pub fn add<S: Service + 'static>(&mut self, service: S) {
        self.inner.dispatcher_mut().add(service);
    }

    pub fn registry(&self) -> &ServiceRegistry {
        self.inner.dispatcher()
    }

    pub fn run(&mut self) -> StopReason {
        self.inner.run()
    }

    pub fn waker(&self) -> Waker {
        self.inner.waker()
    }

    pub fn install_signal_handlers(&self) -> Result<()> {
        Ok(self.inner.install_signal_handlers()?)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connection_count()
    }
}
