//! `Poller` - thin wrapper over epoll.
//!
//! Answers "which registered descriptors are ready" without busy-waiting.
//! The poller does not own channels; it keeps `fd -> Registration` so the
//! event loop can tell whether a descriptor is still registered when its
//! event is delivered.
//!
//! # Stale events
//!
//! One `wait()` can return several events, and handlers run in between.
//! If a handler unregisters (and closes) a descriptor, a later event in the
//! same batch may refer to it, or to a brand new socket that reused the
//! same fd number. Every registration therefore gets a serial number that
//! travels in the epoll user data; `is_current()` rejects events whose
//! serial no longer matches.

use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use crate::channel::{Channel, Interest, Ready};
use crate::error::{cvt, NetError, Result};

/// Maximum events returned by one `wait()`. Larger readiness sets are
/// drained across consecutive waits (epoll is level-triggered here).
pub const MAX_EVENTS: usize = 16;

/// One ready descriptor from a `wait()` batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEvent {
    pub fd: RawFd,
    pub ready: Ready,
    serial: u32,
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    serial: u32,
    interest: Interest,
}

pub struct Poller {
    epfd: OwnedFd,
    registered: HashMap<RawFd, Registration>,
    next_serial: u32,
    events: Vec<libc::epoll_event>,
}

#[inline]
fn token(fd: RawFd, serial: u32) -> u64 {
    ((serial as u64) << 32) | (fd as u32 as u64)
}

#[inline]
fn split_token(token: u64) -> (RawFd, u32) {
    ((token & 0xFFFF_FFFF) as u32 as RawFd, (token >> 32) as u32)
}

impl Poller {
    pub fn new() -> Result<Self> {
        let fd = cvt(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })
            .map_err(|source| NetError::Setup { what: "epoll", source })?;
        Ok(Self {
            // Safety: fd was just returned by epoll_create1 and is owned by nobody else.
            epfd: unsafe { OwnedFd::from_raw_fd(fd) },
            registered: HashMap::new(),
            next_serial: 0,
            events: vec![libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS],
        })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, serial: u32, interest: Interest) -> io::Result<()> {
        let mut ev = libc::epoll_event {
            events: interest.to_epoll(),
            u64: token(fd, serial),
        };
        cvt(unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut ev) })?;
        Ok(())
    }

    /// Add `channel`'s descriptor with its current interest.
    ///
    /// Fails with `NetError::Registration` when epoll refuses it (fd
    /// limit, already registered, a descriptor type epoll cannot watch).
    pub fn register(&mut self, channel: &Channel) -> Result<()> {
        let fd = channel.fd();
        self.next_serial = self.next_serial.wrapping_add(1);
        let serial = self.next_serial;
        self.ctl(libc::EPOLL_CTL_ADD, fd, serial, channel.interest())
            .map_err(|source| NetError::Registration { fd, source })?;
        self.registered.insert(
            fd,
            Registration { serial, interest: channel.interest() },
        );
        Ok(())
    }

    /// Push a changed interest set for an already registered channel.
    pub fn modify(&mut self, channel: &Channel) -> Result<()> {
        let fd = channel.fd();
        let Some(reg) = self.registered.get_mut(&fd) else {
            return Err(NetError::Registration {
                fd,
                source: io::Error::from_raw_os_error(libc::ENOENT),
            });
        };
        if reg.interest == channel.interest() {
            return Ok(());
        }
        let serial = reg.serial;
        self.ctl(libc::EPOLL_CTL_MOD, fd, serial, channel.interest())
            .map_err(|source| NetError::Registration { fd, source })?;
        if let Some(reg) = self.registered.get_mut(&fd) {
            reg.interest = channel.interest();
        }
        Ok(())
    }

    /// Remove `fd`. Unregistering an absent descriptor is a no-op.
    ///
    /// Must run before the descriptor is closed, otherwise the kernel has
    /// already dropped it from the epoll set and the map entry would leak.
    pub fn unregister(&mut self, fd: RawFd) {
        if self.registered.remove(&fd).is_none() {
            return;
        }
        // ENOENT/EBADF here mean the kernel already forgot the fd; the map
        // entry is gone either way.
        let _ = unsafe {
            libc::epoll_ctl(
                self.epfd.as_raw_fd(),
                libc::EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut(),
            )
        };
    }

    /// Block until something is ready or `timeout` elapses (`None` waits
    /// forever). At most `MAX_EVENTS` events are returned.
    ///
    /// A signal interrupting the wait yields an empty batch. Any other
    /// failure is `NetError::Poll` and is fatal for the loop.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<Vec<ReadyEvent>> {
        let timeout_ms = match timeout {
            None => -1,
            Some(d) => d.as_millis().min(i32::MAX as u128) as libc::c_int,
        };
        let n = unsafe {
            libc::epoll_wait(
                self.epfd.as_raw_fd(),
                self.events.as_mut_ptr(),
                MAX_EVENTS as libc::c_int,
                timeout_ms,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(NetError::Poll(err));
        }

        let mut batch = Vec::with_capacity(n as usize);
        for ev in &self.events[..n as usize] {
            // Copy out of the (packed on x86_64) struct before use.
            let (events, data) = (ev.events, ev.u64);
            let (fd, serial) = split_token(data);
            batch.push(ReadyEvent {
                fd,
                ready: Ready::from_epoll(events),
                serial,
            });
        }
        Ok(batch)
    }

    /// Whether `event` still refers to a live registration.
    #[inline]
    pub fn is_current(&self, event: &ReadyEvent) -> bool {
        self.registered
            .get(&event.fd)
            .is_some_and(|reg| reg.serial == event.serial)
    }

    #[inline]
    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.registered.contains_key(&fd)
    }

    /// Registered interest for `fd`, if any.
    pub fn interest(&self, fd: RawFd) -> Option<Interest> {
        self.registered.get(&fd).map(|reg| reg.interest)
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }
}
