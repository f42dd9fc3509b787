//! `Server`: an `EventLoop`, an `Acceptor` and the connection table.
//!
//! The table (`fd -> Connection`) is the only owner of each connection.
//! Removing an entry deregisters the channel and drops the connection,
//! which closes its descriptor exactly once.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::os::fd::{OwnedFd, RawFd};

use photon_core::config::ServerConfig;
use photon_core::log::Logger;
use photon_core::{pdebug, perror, pinfo};

use crate::acceptor::{Acceptor, ConnectionObserver};
use crate::connection::{ConnState, Connection, Dispatch};
use crate::error::Result;
use crate::event_loop::{EventLoop, LoopHandle, ReadyHandler, StopReason, Waker};
use crate::signal;

pub struct Server<D: Dispatch> {
    event_loop: EventLoop,
    core: ServerCore<D>,
}

struct ServerCore<D> {
    acceptor: Acceptor,
    connections: HashMap<RawFd, Connection>,
    dispatch: D,
    log: Logger,
}

/// Registers freshly accepted sockets; lives for one acceptor callback.
struct Admit<'a, 'l> {
    lp: &'a mut LoopHandle<'l>,
    connections: &'a mut HashMap<RawFd, Connection>,
    log: &'a Logger,
}

impl ConnectionObserver for Admit<'_, '_> {
    fn on_new_connection(&mut self, fd: OwnedFd, peer: SocketAddr) {
        let conn = Connection::new(fd, peer, self.log.clone());
        if let Err(e) = self.lp.add_channel(conn.channel()) {
            // Dropping `conn` closes the socket.
            perror!(*self.log, "dropping connection from {}: {}", peer, e);
            return;
        }
        pdebug!(*self.log, "connection fd={} from {} open", conn.fd(), peer);
        self.connections.insert(conn.fd(), conn);
    }
}

impl<D: Dispatch> ServerCore<D> {
    fn close_connection(&mut self, lp: &mut LoopHandle<'_>, fd: RawFd) {
        if let Some(mut conn) = self.connections.remove(&fd) {
            conn.close(lp);
            pdebug!(self.log, "connection fd={} from {} closed", fd, conn.peer());
        }
    }
}

impl<D: Dispatch> ReadyHandler for ServerCore<D> {
    fn handle_read(&mut self, lp: &mut LoopHandle<'_>, fd: RawFd) {
        if fd == self.acceptor.fd() {
            let mut admit = Admit {
                lp,
                connections: &mut self.connections,
                log: &self.log,
            };
            self.acceptor.handle_read(&mut admit);
            return;
        }
        let state = match self.connections.get_mut(&fd) {
            Some(conn) => conn.handle_read(lp, &mut self.dispatch),
            None => return,
        };
        if state != ConnState::Open {
            self.close_connection(lp, fd);
        }
    }

    fn handle_write(&mut self, lp: &mut LoopHandle<'_>, fd: RawFd) {
        let state = match self.connections.get_mut(&fd) {
            Some(conn) => conn.handle_write(lp),
            None => return,
        };
        if state != ConnState::Open {
            self.close_connection(lp, fd);
        }
    }
}

impl<D: Dispatch> Server<D> {
    /// Bind the listener and register it. Fails if the address cannot be
    /// bound; callers treat that as fatal.
    pub fn new(config: &ServerConfig, dispatch: D, log: Logger) -> Result<Self> {
        let mut event_loop = EventLoop::new()?;
        let mut acceptor = Acceptor::bind(config, log.clone())?;
        acceptor.listen(&mut event_loop)?;
        Ok(Self {
            event_loop,
            core: ServerCore {
                acceptor,
                connections: HashMap::new(),
                dispatch,
                log,
            },
        })
    }

    /// Serve until woken or the poller fails.
    pub fn run(&mut self) -> StopReason {
        pinfo!(self.core.log, "serving on {}", self.core.acceptor.local_addr());
        let reason = self.event_loop.run(&mut self.core);
        match reason {
            StopReason::PollerFailed => {
                let err = self.event_loop.take_error();
                perror!(
                    self.core.log,
                    "event loop stopped: {}",
                    err.map_or_else(|| "unknown poller error".to_string(), |e| e.to_string())
                );
            }
            _ => pinfo!(self.core.log, "event loop stopped ({:?})", reason),
        }
        reason
    }

    pub fn waker(&self) -> Waker {
        self.event_loop.waker()
    }

    /// Stop on SIGINT/SIGTERM.
    pub fn install_signal_handlers(&self) -> Result<()> {
        signal::install_stop_handler(self.waker())
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.core.acceptor.local_addr()
    }

    pub fn connection_count(&self) -> usize {
        self.core.connections.len()
    }

    pub fn dispatcher(&self) -> &D {
        &self.core.dispatch
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.core.dispatch
    }
}
