//! Single-threaded reactor.
//!
//! `EventLoop` owns one [`Poller`] and an eventfd used as its wake-up
//! descriptor. `run()` blocks in `Poller::wait`, then routes each ready
//! descriptor to a [`ReadyHandler`], read before write.
//!
//! Channels are owned by the handler (the server's connection table, the
//! acceptor), never by the loop. During dispatch the handler gets a
//! [`LoopHandle`] so it can add, re-arm or remove channels, including the
//! one it is being called for. Events for a channel removed earlier in the
//! same batch are dropped (see `poller` module docs).
//!
//! State machine: `Running -> Stopped`. The stop flag is checked between
//! batches only, so a handler that is already running always finishes.

use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

use crate::channel::{Channel, Interest};
use crate::error::{cvt, NetError, Result};
use crate::poller::Poller;

/// Why `run()` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A `Waker` fired (another thread or a signal handler).
    WokenUp,
    /// `stop()` was called from the loop thread.
    Stopped,
    /// `Poller::wait` failed; the error is kept in `EventLoop::take_error`.
    PollerFailed,
}

/// Receives readiness for descriptors the loop does not own.
pub trait ReadyHandler {
    fn handle_read(&mut self, lp: &mut LoopHandle<'_>, fd: RawFd);

    /// Called when a channel registered for `WRITABLE` can take more data.
    fn handle_write(&mut self, lp: &mut LoopHandle<'_>, fd: RawFd) {
        let _ = (lp, fd);
    }
}

/// The loop's registration surface, lent to handlers during dispatch.
pub struct LoopHandle<'a> {
    poller: &'a mut Poller,
    wake_fd: RawFd,
    stop_requested: &'a mut bool,
}

impl LoopHandle<'_> {
    pub fn add_channel(&mut self, channel: &Channel) -> Result<()> {
        self.poller.register(channel)
    }

    pub fn update_channel(&mut self, channel: &Channel) -> Result<()> {
        self.poller.modify(channel)
    }

    /// Deregister `fd`. Safe for the channel currently being dispatched.
    pub fn remove_channel(&mut self, fd: RawFd) {
        if fd != self.wake_fd {
            self.poller.unregister(fd);
        }
    }

    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.poller.is_registered(fd)
    }

    /// Stop after the current batch.
    pub fn stop(&mut self) {
        *self.stop_requested = true;
    }
}

/// Cross-thread, signal-safe wake-up for one `EventLoop`.
///
/// Holds its own duplicate of the eventfd, so waking a loop that has
/// already been dropped writes to a still-open (and now unwatched)
/// descriptor rather than to whatever reused its number.
#[derive(Clone)]
pub struct Waker {
    fd: Arc<OwnedFd>,
}

impl Waker {
    /// Bump the eventfd counter with one `write(2)`.
    ///
    /// No locks and no allocation, so this may run inside a signal
    /// handler. Errors are ignored: EAGAIN means a wake-up is already
    /// pending.
    pub fn wake(&self) {
        raw_wake(self.fd.as_raw_fd());
    }

    pub(crate) fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl std::fmt::Debug for Waker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waker").field("fd", &self.raw_fd()).finish()
    }
}

/// Async-signal-safe eventfd bump.
#[inline]
pub(crate) fn raw_wake(fd: RawFd) {
    let val: u64 = 1;
    unsafe {
        libc::write(
            fd,
            &val as *const u64 as *const libc::c_void,
            std::mem::size_of::<u64>(),
        );
    }
}

pub struct EventLoop {
    poller: Poller,
    wake: Channel,
    waker_fd: Arc<OwnedFd>,
    stop_requested: bool,
    stopped: Option<StopReason>,
    last_error: Option<NetError>,
}

impl EventLoop {
    /// Create the poller and the wake-up eventfd, and register the latter.
    pub fn new() -> Result<Self> {
        let mut poller = Poller::new()?;
        let fd = cvt(unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) })
            .map_err(|source| NetError::Setup { what: "eventfd", source })?;
        // Safety: fresh descriptor from eventfd(2).
        let wake = Channel::new(unsafe { OwnedFd::from_raw_fd(fd) }, Interest::READABLE);
        // Wakers write through a duplicate so they never outlive the
        // descriptor they point at.
        let waker_fd = wake
            .as_fd()
            .try_clone_to_owned()
            .map_err(|source| NetError::Setup { what: "eventfd", source })?;
        poller.register(&wake)?;

        Ok(Self {
            poller,
            wake,
            waker_fd: Arc::new(waker_fd),
            stop_requested: false,
            stopped: None,
            last_error: None,
        })
    }

    /// Run until woken, stopped, or the poller fails.
    ///
    /// Calling `run` again after it returned yields the same reason
    /// immediately: `Stopped` is terminal.
    pub fn run<H: ReadyHandler + ?Sized>(&mut self, handler: &mut H) -> StopReason {
        let wake_fd = self.wake.fd();
        while self.stopped.is_none() {
            let batch = match self.poller.wait(None) {
                Ok(batch) => batch,
                Err(err) => {
                    self.last_error = Some(err);
                    self.stopped = Some(StopReason::PollerFailed);
                    break;
                }
            };

            let mut woken = false;
            for ev in &batch {
                if !self.poller.is_current(ev) {
                    continue;
                }
                if ev.fd == wake_fd {
                    drain_eventfd(wake_fd);
                    woken = true;
                    continue;
                }

                let mut lp = LoopHandle {
                    poller: &mut self.poller,
                    wake_fd,
                    stop_requested: &mut self.stop_requested,
                };
                if ev.ready.is_readable() {
                    handler.handle_read(&mut lp, ev.fd);
                }
                // The read handler may have removed the channel.
                if ev.ready.is_writable() && lp.poller.is_current(ev) {
                    handler.handle_write(&mut lp, ev.fd);
                }
            }

            if woken {
                self.stopped = Some(StopReason::WokenUp);
            } else if self.stop_requested {
                self.stopped = Some(StopReason::Stopped);
            }
        }
        self.stopped.unwrap_or(StopReason::Stopped)
    }

    /// A handle that stops this loop from any thread.
    pub fn waker(&self) -> Waker {
        Waker { fd: Arc::clone(&self.waker_fd) }
    }

    /// Same-thread stop, honoured after the current batch.
    pub fn stop(&mut self) {
        self.stop_requested = true;
        if self.stopped.is_none() {
            self.stopped = Some(StopReason::Stopped);
        }
    }

    pub fn is_running(&self) -> bool {
        self.stopped.is_none()
    }

    /// The poller error behind `StopReason::PollerFailed`, if any.
    pub fn take_error(&mut self) -> Option<NetError> {
        self.last_error.take()
    }

    pub fn add_channel(&mut self, channel: &Channel) -> Result<()> {
        self.poller.register(channel)
    }

    pub fn update_channel(&mut self, channel: &Channel) -> Result<()> {
        self.poller.modify(channel)
    }

    pub fn remove_channel(&mut self, fd: RawFd) {
        if fd != self.wake.fd() {
            self.poller.unregister(fd);
        }
    }

    /// Registered descriptors, including the wake-up eventfd.
    pub fn channel_count(&self) -> usize {
        self.poller.len()
    }
}

/// Reset the eventfd counter. A single read clears it (no EFD_SEMAPHORE);
/// EAGAIN means another batch already drained it.
fn drain_eventfd(fd: RawFd) {
    let mut val: u64 = 0;
    unsafe {
        libc::read(
            fd,
            &mut val as *mut u64 as *mut libc::c_void,
            std::mem::size_of::<u64>(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::Duration;

    struct Noop;

    impl ReadyHandler for Noop {
        fn handle_read(&mut self, _lp: &mut LoopHandle<'_>, _fd: RawFd) {}
    }

    /// Owns channels keyed by fd; on the first read it removes every
    /// channel it owns, then asks the loop to stop.
    struct DropAll {
        channels: HashMap<RawFd, Channel>,
        calls: Vec<RawFd>,
    }

    impl ReadyHandler for DropAll {
        fn handle_read(&mut self, lp: &mut LoopHandle<'_>, fd: RawFd) {
            self.calls.push(fd);
            for (fd, _ch) in self.channels.drain() {
                lp.remove_channel(fd);
            }
            lp.stop();
        }
    }

    #[test]
    fn test_wake_from_other_thread() {
        let mut lp = EventLoop::new().unwrap();
        assert!(lp.is_running());
        let waker = lp.waker();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            waker.wake();
        });
        assert_eq!(lp.run(&mut Noop), StopReason::WokenUp);
        assert!(!lp.is_running());
        t.join().unwrap();
    }

    #[test]
    fn test_wake_before_run() {
        let mut lp = EventLoop::new().unwrap();
        lp.waker().wake();
        lp.waker().wake();
        assert_eq!(lp.run(&mut Noop), StopReason::WokenUp);
        // Terminal.
        assert_eq!(lp.run(&mut Noop), StopReason::WokenUp);
    }

    #[test]
    fn test_stop_before_run() {
        let mut lp = EventLoop::new().unwrap();
        lp.stop();
        assert_eq!(lp.run(&mut Noop), StopReason::Stopped);
    }

    #[test]
    fn test_removed_channel_not_dispatched_in_same_batch() {
        let mut lp = EventLoop::new().unwrap();
        let mut handler = DropAll { channels: HashMap::new(), calls: Vec::new() };
        let mut peers = Vec::new();
        for _ in 0..2 {
            let (a, mut b) = UnixStream::pair().unwrap();
            b.write_all(b"x").unwrap();
            let ch = Channel::new(OwnedFd::from(a), Interest::READABLE);
            lp.add_channel(&ch).unwrap();
            handler.channels.insert(ch.fd(), ch);
            peers.push(b);
        }
        assert_eq!(lp.channel_count(), 3);

        assert_eq!(lp.run(&mut handler), StopReason::Stopped);
        assert_eq!(handler.calls.len(), 1);
        assert_eq!(lp.channel_count(), 1);
    }

    #[test]
    fn test_read_then_write_dispatch() {
        struct Echo {
            ch: Channel,
            pending: Vec<u8>,
            reads: usize,
            writes: usize,
        }

        impl ReadyHandler for Echo {
            fn handle_read(&mut self, lp: &mut LoopHandle<'_>, _fd: RawFd) {
                self.reads += 1;
                let mut buf = [0u8; 16];
                let n = unsafe {
                    libc::recv(self.ch.fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
                };
                assert!(n > 0);
                self.pending.extend_from_slice(&buf[..n as usize]);
                self.ch.set_interest(Interest::READABLE | Interest::WRITABLE);
                lp.update_channel(&self.ch).unwrap();
            }

            fn handle_write(&mut self, lp: &mut LoopHandle<'_>, _fd: RawFd) {
                self.writes += 1;
                let n = unsafe {
                    libc::send(
                        self.ch.fd(),
                        self.pending.as_ptr() as *const libc::c_void,
                        self.pending.len(),
                        0,
                    )
                };
                assert_eq!(n as usize, self.pending.len());
                self.pending.clear();
                lp.remove_channel(self.ch.fd());
                lp.stop();
            }
        }

        let (a, mut b) = UnixStream::pair().unwrap();
        let mut lp = EventLoop::new().unwrap();
        let mut echo = Echo {
            ch: Channel::new(OwnedFd::from(a), Interest::READABLE),
            pending: Vec::new(),
            reads: 0,
            writes: 0,
        };
        lp.add_channel(&echo.ch).unwrap();
        b.write_all(b"hello").unwrap();

        assert_eq!(lp.run(&mut echo), StopReason::Stopped);
        assert_eq!(echo.reads, 1);
        assert_eq!(echo.writes, 1);

        let mut out = [0u8; 5];
        b.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn test_wake_fd_cannot_be_removed() {
        let mut lp = EventLoop::new().unwrap();
        let fd = lp.wake.fd();
        lp.remove_channel(fd);
        assert_eq!(lp.channel_count(), 1);
    }
}
