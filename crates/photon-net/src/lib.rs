//! # photon-net
//!
//! Single-threaded reactor networking for photon:
//!
//! - [`Poller`] / [`EventLoop`] - epoll readiness, wake-up eventfd, graceful stop
//! - [`RingBuffer`] - growable circular byte buffer with socket I/O
//! - [`codec`] - `[u32 length][payload]` framing
//! - [`Acceptor`] / [`Connection`] / [`Server`] - TCP serving on top of the loop
//!
//! Everything runs on the thread that calls `Server::run`. The only
//! cross-thread (and signal-handler) entry point is [`Waker::wake`].
//!
//! ```ignore
//! use photon_core::config::ServerConfig;
//! use photon_net::Server;
//!
//! let config = ServerConfig::from_env();
//! let log = config.stderr_logger();
//! let mut server = Server::new(&config, |req: &[u8]| req.to_vec(), log)?;
//! server.install_signal_handlers()?;
//! server.run();
//! ```

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod acceptor;
        pub mod channel;
        pub mod codec;
        pub mod connection;
        pub mod error;
        pub mod event_loop;
        pub mod poller;
        pub mod ring_buffer;
        pub mod server;
        pub mod signal;
        mod socket;

        pub use acceptor::{Acceptor, ConnectionObserver, ListenObserver};
        pub use channel::{Channel, Interest, Ready};
        pub use codec::FrameTooLarge;
        pub use connection::{ConnState, Connection, Dispatch};
        pub use error::{NetError, Result};
        pub use event_loop::{EventLoop, LoopHandle, ReadyHandler, StopReason, Waker};
        pub use poller::{Poller, ReadyEvent, MAX_EVENTS};
        pub use ring_buffer::{IoStatus, RingBuffer};
        pub use server::Server;
    } else {
        compile_error!("photon-net requires Linux (epoll, eventfd, accept4)");
    }
}
