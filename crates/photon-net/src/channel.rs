//! `Channel` - one descriptor plus the readiness it wants to hear about.
//!
//! A channel exclusively owns its descriptor through an `OwnedFd`, so the
//! descriptor is closed exactly once: when the channel's single owner
//! (a `Connection`, the `Acceptor`, or the `EventLoop` for its wake-up
//! eventfd) drops it. The poller never owns channels; it only remembers
//! which descriptors are registered and with which interest.
//!
//! Handlers are not stored on the channel. The owner of the channel is
//! the handler, and the event loop routes readiness to it by descriptor
//! (see `event_loop::ReadyHandler`).

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

/// Readiness a channel is registered for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest(u8);

impl Interest {
    pub const NONE: Interest = Interest(0);
    pub const READABLE: Interest = Interest(0b01);
    pub const WRITABLE: Interest = Interest(0b10);

    #[inline]
    pub fn is_readable(self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    #[inline]
    pub fn is_writable(self) -> bool {
        self.0 & Self::WRITABLE.0 != 0
    }

    /// `self` with `other`'s bits cleared.
    #[inline]
    pub fn remove(self, other: Interest) -> Interest {
        Interest(self.0 & !other.0)
    }

    /// epoll event mask for this interest.
    pub(crate) fn to_epoll(self) -> u32 {
        let mut events = 0u32;
        if self.is_readable() {
            events |= libc::EPOLLIN as u32 | libc::EPOLLRDHUP as u32;
        }
        if self.is_writable() {
            events |= libc::EPOLLOUT as u32;
        }
        events
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_readable(), self.is_writable()) {
            (true, true) => f.write_str("READABLE | WRITABLE"),
            (true, false) => f.write_str("READABLE"),
            (false, true) => f.write_str("WRITABLE"),
            (false, false) => f.write_str("NONE"),
        }
    }
}

/// Readiness reported by the poller for one descriptor.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Ready {
    readable: bool,
    writable: bool,
}

impl Ready {
    pub const READABLE: Ready = Ready { readable: true, writable: false };
    pub const WRITABLE: Ready = Ready { readable: false, writable: true };

    /// Translate an epoll event mask.
    ///
    /// Hang-up and error conditions are folded into "readable": the read
    /// path is where a closed or broken peer gets noticed.
    pub(crate) fn from_epoll(events: u32) -> Ready {
        let read_mask = (libc::EPOLLIN | libc::EPOLLPRI | libc::EPOLLHUP | libc::EPOLLRDHUP | libc::EPOLLERR) as u32;
        Ready {
            readable: events & read_mask != 0,
            writable: events & libc::EPOLLOUT as u32 != 0,
        }
    }

    #[inline]
    pub fn is_readable(self) -> bool {
        self.readable
    }

    #[inline]
    pub fn is_writable(self) -> bool {
        self.writable
    }
}

impl fmt::Debug for Ready {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ready")
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .finish()
    }
}

/// A descriptor and its registered interest.
///
/// Not `Clone`: identity matters because the poller indexes by fd.
pub struct Channel {
    fd: OwnedFd,
    interest: Interest,
}

impl Channel {
    pub fn new(fd: OwnedFd, interest: Interest) -> Self {
        Self { fd, interest }
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    #[inline]
    pub fn interest(&self) -> Interest {
        self.interest
    }

    /// Change the interest. Takes effect once the channel is passed to
    /// `Poller::modify` / `EventLoop::update_channel`.
    pub fn set_interest(&mut self, interest: Interest) {
        self.interest = interest;
    }
}

impl AsFd for Channel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for Channel {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("fd", &self.fd())
            .field("interest", &self.interest)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interest_bits() {
        let both = Interest::READABLE | Interest::WRITABLE;
        assert!(both.is_readable() && both.is_writable());
        assert_eq!(both.remove(Interest::WRITABLE), Interest::READABLE);
        assert_eq!(format!("{:?}", both), "READABLE | WRITABLE");
        assert_eq!(Interest::NONE.to_epoll(), 0);
        assert_ne!(Interest::READABLE.to_epoll() & libc::EPOLLIN as u32, 0);
        assert_eq!(Interest::READABLE.to_epoll() & libc::EPOLLOUT as u32, 0);
    }

    #[test]
    fn test_ready_from_epoll() {
        let r = Ready::from_epoll(libc::EPOLLIN as u32);
        assert!(r.is_readable() && !r.is_writable());

        let r = Ready::from_epoll(libc::EPOLLOUT as u32);
        assert!(!r.is_readable() && r.is_writable());

        // Hang-up is surfaced on the read path.
        let r = Ready::from_epoll(libc::EPOLLHUP as u32);
        assert!(r.is_readable());
    }

    #[test]
    fn test_channel_owns_fd() {
        let (a, _b) = std::os::unix::net::UnixStream::pair().unwrap();
        let raw = a.as_raw_fd();
        let mut ch = Channel::new(OwnedFd::from(a), Interest::READABLE);
        assert_eq!(ch.fd(), raw);
        ch.set_interest(Interest::READABLE | Interest::WRITABLE);
        assert!(ch.interest().is_writable());
    }
}
