//! One accepted socket: inbound decode, dispatch, outbound encode and flush.
//!
//! State machine: `Open -> Closing -> Closed`.
//!
//! - `Open`: registered for `READABLE`, plus `WRITABLE` while output is
//!   pending and the socket pushed back.
//! - `Closing`: the peer hung up or I/O failed. The owner (the server's
//!   connection table) must call `close()` and then drop the connection.
//! - `Closed`: deregistered. Dropping the connection closes the fd.

use std::net::SocketAddr;
use std::os::fd::{OwnedFd, RawFd};

use photon_core::log::Logger;
use photon_core::{pdebug, perror, ptrace, pwarn};

use crate::channel::{Channel, Interest};
use crate::codec;
use crate::event_loop::LoopHandle;
use crate::ring_buffer::{IoStatus, RingBuffer};

/// Turns one request payload into one response payload.
pub trait Dispatch {
    fn dispatch(&mut self, request: &[u8]) -> Vec<u8>;
}

impl<F> Dispatch for F
where
    F: FnMut(&[u8]) -> Vec<u8>,
{
    fn dispatch(&mut self, request: &[u8]) -> Vec<u8> {
        self(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Open,
    Closing,
    Closed,
}

pub struct Connection {
    channel: Channel,
    inbound: RingBuffer,
    outbound: RingBuffer,
    state: ConnState,
    peer: SocketAddr,
    log: Logger,
}

impl Connection {
    /// Wrap an accepted socket. Registration is the caller's job.
    pub fn new(fd: OwnedFd, peer: SocketAddr, log: Logger) -> Self {
        Self {
            channel: Channel::new(fd, Interest::READABLE),
            inbound: RingBuffer::new(),
            outbound: RingBuffer::new(),
            state: ConnState::Open,
            peer,
            log,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn fd(&self) -> RawFd {
        self.channel.fd()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Response bytes not yet accepted by the socket.
    pub fn pending_output(&self) -> usize {
        self.outbound.len()
    }

    /// Readable: receive, answer every complete frame, flush.
    pub fn handle_read(&mut self, lp: &mut LoopHandle<'_>, dispatch: &mut dyn Dispatch) -> ConnState {
        if self.state != ConnState::Open {
            return self.state;
        }

        match self.inbound.receive_from(self.channel.fd()) {
            Ok(IoStatus::Progress(n)) => {
                ptrace!(self.log, "fd={} received {} bytes", self.fd(), n);
            }
            Ok(IoStatus::WouldBlock) => return self.state,
            Ok(IoStatus::Closed) => {
                pdebug!(self.log, "fd={} peer {} closed", self.fd(), self.peer);
                self.state = ConnState::Closing;
                return self.state;
            }
            Err(e) => {
                pwarn!(self.log, "fd={} recv failed: {}", self.fd(), e);
                self.state = ConnState::Closing;
                return self.state;
            }
        }

        self.answer_frames(dispatch);
        if self.state != ConnState::Open {
            return self.state;
        }
        self.flush(lp)
    }

    /// Writable: finish a flush that previously hit EAGAIN.
    pub fn handle_write(&mut self, lp: &mut LoopHandle<'_>) -> ConnState {
        if self.state != ConnState::Open {
            return self.state;
        }
        self.flush(lp)
    }

    /// Deregister from the loop. The descriptor closes when `self` drops.
    pub fn close(&mut self, lp: &mut LoopHandle<'_>) {
        if self.state == ConnState::Closed {
            return;
        }
        lp.remove_channel(self.channel.fd());
        self.state = ConnState::Closed;
    }

    fn answer_frames(&mut self, dispatch: &mut dyn Dispatch) {
        if codec::buffered_frame_len(&self.inbound).is_none() {
            return;
        }
        let bytes = self.inbound.peek();
        let mut frames = codec::frames(&bytes);
        let mut answered = 0usize;
        for request in frames.by_ref() {
            let response = dispatch.dispatch(request);
            if let Err(e) = codec::encode_into(&response, &mut self.outbound) {
                perror!(self.log, "fd={} cannot frame response: {}", self.fd(), e);
                self.state = ConnState::Closing;
                break;
            }
            answered += 1;
        }
        self.inbound.consume(frames.consumed());
        if answered > 0 {
            ptrace!(self.log, "fd={} answered {} frame(s)", self.fd(), answered);
        }
    }

    /// Send until the outbound buffer is empty or the socket would block.
    fn flush(&mut self, lp: &mut LoopHandle<'_>) -> ConnState {
        loop {
            if self.outbound.is_empty() {
                return self.set_writable(lp, false);
            }
            match self.outbound.send_to(self.channel.fd()) {
                Ok(IoStatus::Progress(_)) => continue,
                Ok(IoStatus::WouldBlock) => return self.set_writable(lp, true),
                Ok(IoStatus::Closed) => {
                    self.state = ConnState::Closing;
                    return self.state;
                }
                Err(e) => {
                    pwarn!(self.log, "fd={} send failed: {}", self.fd(), e);
                    self.state = ConnState::Closing;
                    return self.state;
                }
            }
        }
    }

    fn set_writable(&mut self, lp: &mut LoopHandle<'_>, on: bool) -> ConnState {
        let current = self.channel.interest();
        if current.is_writable() == on {
            return self.state;
        }
        let next = if on {
            current | Interest::WRITABLE
        } else {
            current.remove(Interest::WRITABLE)
        };
        self.channel.set_interest(next);
        if let Err(e) = lp.update_channel(&self.channel) {
            perror!(self.log, "fd={} cannot re-arm: {}", self.fd(), e);
            self.state = ConnState::Closing;
        }
        self.state
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("fd", &self.fd())
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("inbound", &self.inbound.len())
            .field("outbound", &self.outbound.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::{EventLoop, ReadyHandler};
    use photon_core::log::NullSink;
    use std::io::{ErrorKind, Read, Write};
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::os::unix::net::UnixStream;

    /// Owns one connection and stops the loop after every batch.
    struct OneShot {
        conn: Connection,
        requests: Vec<Vec<u8>>,
    }

    impl ReadyHandler for OneShot {
        fn handle_read(&mut self, lp: &mut LoopHandle<'_>, _fd: RawFd) {
            let seen = &mut self.requests;
            let mut upper = |req: &[u8]| {
                seen.push(req.to_vec());
                req.to_ascii_uppercase()
            };
            if self.conn.handle_read(lp, &mut upper) == ConnState::Closing {
                self.conn.close(lp);
            }
            lp.stop();
        }

        fn handle_write(&mut self, lp: &mut LoopHandle<'_>, _fd: RawFd) {
            if self.conn.handle_write(lp) == ConnState::Closing {
                self.conn.close(lp);
            }
            lp.stop();
        }
    }

    fn setup() -> (EventLoop, OneShot, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let peer = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1));
        let conn = Connection::new(OwnedFd::from(a), peer, NullSink::logger());
        let mut lp = EventLoop::new().unwrap();
        lp.add_channel(conn.channel()).unwrap();
        (lp, OneShot { conn, requests: Vec::new() }, b)
    }

    fn run_once(handler: &mut OneShot) {
        let mut lp = EventLoop::new().unwrap();
        lp.add_channel(handler.conn.channel()).unwrap();
        lp.run(handler);
    }

    fn read_frame(peer: &mut UnixStream) -> Vec<u8> {
        let mut hdr = [0u8; codec::HEADER_LEN];
        peer.read_exact(&mut hdr).unwrap();
        let mut payload = vec![0u8; u32::from_ne_bytes(hdr) as usize];
        peer.read_exact(&mut payload).unwrap();
        payload
    }

    #[test]
    fn test_dispatch_trait_for_closures() {
        let mut d = |req: &[u8]| req.iter().rev().copied().collect::<Vec<u8>>();
        assert_eq!(Dispatch::dispatch(&mut d, b"abc"), b"cba");
    }

    #[test]
    fn test_sticky_frames_answered_in_order() {
        let (mut lp, mut h, mut peer) = setup();
        let mut wire = codec::encode(b"first").unwrap();
        wire.extend(codec::encode(b"second").unwrap());
        peer.write_all(&wire).unwrap();

        lp.run(&mut h);
        assert_eq!(h.requests, vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(read_frame(&mut peer), b"FIRST");
        assert_eq!(read_frame(&mut peer), b"SECOND");
        assert_eq!(h.conn.state(), ConnState::Open);
        assert_eq!(h.conn.pending_output(), 0);
    }

    #[test]
    fn test_partial_frame_waits_for_rest() {
        let (mut lp, mut h, mut peer) = setup();
        let wire = codec::encode(b"split request").unwrap();
        peer.write_all(&wire[..6]).unwrap();
        lp.run(&mut h);
        assert!(h.requests.is_empty());

        peer.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(peer.read(&mut buf).unwrap_err().kind(), ErrorKind::WouldBlock);
        peer.set_nonblocking(false).unwrap();

        peer.write_all(&wire[6..]).unwrap();
        run_once(&mut h);
        assert_eq!(h.requests, vec![b"split request".to_vec()]);
        assert_eq!(read_frame(&mut peer), b"SPLIT REQUEST");
    }

    #[test]
    fn test_frame_spanning_several_reads() {
        let (_lp, mut h, mut peer) = setup();
        let payload = vec![b'a'; 5000];
        peer.write_all(&codec::encode(&payload).unwrap()).unwrap();

        // One receive chunk per readiness; the frame needs five.
        for chunk in 1..=4 {
            run_once(&mut h);
            assert!(h.requests.is_empty());
            assert_eq!(h.conn.inbound.len(), chunk * crate::ring_buffer::RECV_CHUNK);
        }
        run_once(&mut h);
        assert_eq!(h.requests, vec![payload]);
        assert!(h.conn.inbound.is_empty());
        assert_eq!(read_frame(&mut peer), vec![b'A'; 5000]);
    }

    #[test]
    fn test_empty_frame_is_dispatched() {
        let (mut lp, mut h, mut peer) = setup();
        peer.write_all(&codec::encode(b"").unwrap()).unwrap();
        lp.run(&mut h);
        assert_eq!(h.requests, vec![Vec::<u8>::new()]);
        assert_eq!(read_frame(&mut peer), b"");
    }

    #[test]
    fn test_peer_close() {
        let (mut lp, mut h, peer) = setup();
        drop(peer);
        lp.run(&mut h);
        assert_eq!(h.conn.state(), ConnState::Closed);
        assert_eq!(lp.channel_count(), 1);
    }
}
