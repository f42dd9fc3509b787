//! Listening socket.
//!
//! `Acceptor::bind` does all the fallible startup work (socket, bind,
//! listen); a failure there is fatal for the process. After that the
//! acceptor only reacts to readability: one `accept4` per notification,
//! with the new descriptor handed to a [`ConnectionObserver`]. Accept
//! failures are logged and dropped, and the listening channel stays armed.

use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use photon_core::config::ServerConfig;
use photon_core::log::Logger;
use photon_core::{pdebug, perror, pinfo};

use crate::channel::{Channel, Interest};
use crate::error::Result;
use crate::event_loop::{EventLoop, LoopHandle};
use crate::socket;

/// Whoever registers the listening channel with a poller.
pub trait ListenObserver {
    fn on_listen(&mut self, channel: &Channel) -> Result<()>;
}

/// Receives every accepted connection. Takes ownership of the descriptor.
pub trait ConnectionObserver {
    fn on_new_connection(&mut self, fd: OwnedFd, peer: SocketAddr);
}

impl ListenObserver for EventLoop {
    fn on_listen(&mut self, channel: &Channel) -> Result<()> {
        self.add_channel(channel)
    }
}

impl ListenObserver for LoopHandle<'_> {
    fn on_listen(&mut self, channel: &Channel) -> Result<()> {
        self.add_channel(channel)
    }
}

pub struct Acceptor {
    channel: Channel,
    local_addr: SocketAddr,
    log: Logger,
}

impl Acceptor {
    /// Bind and listen on `config`'s address with its backlog.
    pub fn bind(config: &ServerConfig, log: Logger) -> Result<Self> {
        let addr = config.socket_addr()?;
        let fd = socket::listen_tcp(addr, config.backlog)?;
        let local_addr = socket::local_addr(fd.as_raw_fd())?;
        pinfo!(log, "listening on {} (backlog {})", local_addr, config.backlog);
        Ok(Self {
            channel: Channel::new(fd, Interest::READABLE),
            local_addr,
            log,
        })
    }

    /// Hand the listening channel to `observer` for registration.
    pub fn listen<O: ListenObserver + ?Sized>(&mut self, observer: &mut O) -> Result<()> {
        observer.on_listen(&self.channel)
    }

    /// Accept one pending connection, if any.
    pub fn handle_read<O: ConnectionObserver + ?Sized>(&mut self, observer: &mut O) {
        match socket::accept(self.channel.fd()) {
            Ok((fd, peer)) => {
                pdebug!(self.log, "accepted fd={} from {}", fd.as_raw_fd(), peer);
                observer.on_new_connection(fd, peer);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                pdebug!(self.log, "accept: nothing pending");
            }
            Err(e) => {
                perror!(self.log, "accept failed: {}", e);
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn fd(&self) -> RawFd {
        self.channel.fd()
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetError;
    use photon_core::log::NullSink;
    use std::net::TcpStream;
    use std::time::Duration;

    #[derive(Default)]
    struct Collect {
        accepted: Vec<(OwnedFd, SocketAddr)>,
    }

    impl ConnectionObserver for Collect {
        fn on_new_connection(&mut self, fd: OwnedFd, peer: SocketAddr) {
            self.accepted.push((fd, peer));
        }
    }

    struct Refuse;

    impl ListenObserver for Refuse {
        fn on_listen(&mut self, channel: &Channel) -> Result<()> {
            Err(NetError::Registration {
                fd: channel.fd(),
                source: io::Error::from_raw_os_error(libc::EMFILE),
            })
        }
    }

    fn loopback() -> ServerConfig {
        ServerConfig::new().host("127.0.0.1").port(0)
    }

    #[test]
    fn test_bind_ephemeral() {
        let acceptor = Acceptor::bind(&loopback(), NullSink::logger()).unwrap();
        assert_ne!(acceptor.local_addr().port(), 0);
        assert!(acceptor.channel().interest().is_readable());
    }

    #[test]
    fn test_bind_rejects_bad_host() {
        let config = ServerConfig::new().host("not-an-ip").port(0);
        assert!(matches!(
            Acceptor::bind(&config, NullSink::logger()),
            Err(NetError::Config(_))
        ));
    }

    #[test]
    fn test_listen_registers_with_loop() {
        let mut acceptor = Acceptor::bind(&loopback(), NullSink::logger()).unwrap();
        let mut lp = EventLoop::new().unwrap();
        acceptor.listen(&mut lp).unwrap();
        assert_eq!(lp.channel_count(), 2);

        assert!(acceptor.listen(&mut Refuse).is_err());
    }

    #[test]
    fn test_accept_one_per_call() {
        let mut acceptor = Acceptor::bind(&loopback(), NullSink::logger()).unwrap();
        let mut seen = Collect::default();

        // Nothing pending: logged, not an error.
        acceptor.handle_read(&mut seen);
        assert!(seen.accepted.is_empty());

        let _c1 = TcpStream::connect(acceptor.local_addr()).unwrap();
        let _c2 = TcpStream::connect(acceptor.local_addr()).unwrap();
        for _ in 0..200 {
            if seen.accepted.len() == 2 {
                break;
            }
            let before = seen.accepted.len();
            acceptor.handle_read(&mut seen);
            assert!(seen.accepted.len() <= before + 1);
            if seen.accepted.len() == before {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        assert_eq!(seen.accepted.len(), 2);
    }
}
