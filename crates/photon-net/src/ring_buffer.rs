//! Growable circular byte buffer
//!
//! One inbound and one outbound buffer per connection. Layout:
//!
//! ```text
//!   0        write        read          cap
//!   |###########|...........|#############|     wrapped: len = cap - read + write
//!   0        read         write         cap
//!   |...........|###########|.............|     linear:  len = write - read
//! ```
//!
//! Invariant: `write == (read + len) % cap` after every operation.
//!
//! Growth at least doubles the capacity. When the live bytes wrap, the
//! wrapped prefix `[0, write)` is copied to `[old_cap, old_cap + write)` so
//! the data is contiguous from `read` again before the cursors move.

use std::io;
use std::os::fd::RawFd;

use crate::error::cvt_size;

/// Initial capacity of `RingBuffer::new()`.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Bytes requested from the kernel per `receive_from` call.
pub const RECV_CHUNK: usize = 1024;

/// Outcome of one non-blocking transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
    /// `n` bytes moved (0 only when there was nothing to send).
    Progress(usize),
    /// The socket would block (EAGAIN) or the call was interrupted.
    /// Nothing moved; retry on the next readiness notification.
    WouldBlock,
    /// Orderly shutdown by the peer (`recv` returned 0).
    Closed,
}

pub struct RingBuffer {
    buf: Vec<u8>,
    read: usize,
    write: usize,
    len: usize,
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RingBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` is raised to 1 so growth-by-doubling always progresses.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(1)],
            read: 0,
            write: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.len = 0;
    }

    fn grow(&mut self, needed: usize) {
        let old_cap = self.buf.len();
        let mut new_cap = old_cap;
        while new_cap < needed {
            new_cap = new_cap.checked_mul(2).unwrap_or(needed);
        }
        self.buf.resize(new_cap, 0);

        // Live bytes that ran past the old end sit at [0, wrapped).
        let wrapped = (self.read + self.len).saturating_sub(old_cap);
        if wrapped > 0 {
            self.buf.copy_within(0..wrapped, old_cap);
        }
        self.write = (self.read + self.len) % new_cap;
    }

    /// Append `data`, growing first if it does not fit.
    pub fn write(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let needed = self.len + data.len();
        if needed > self.capacity() {
            self.grow(needed);
        }

        let cap = self.capacity();
        let first = data.len().min(cap - self.write);
        self.buf[self.write..self.write + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        if rest > 0 {
            self.buf[..rest].copy_from_slice(&data[first..]);
        }
        self.len += data.len();
        self.write = (self.write + data.len()) % cap;
    }

    /// Live bytes as (up to) two slices in logical order.
    pub fn as_slices(&self) -> (&[u8], &[u8]) {
        let cap = self.capacity();
        if self.read + self.len <= cap {
            (&self.buf[self.read..self.read + self.len], &[][..])
        } else {
            let tail = cap - self.read;
            (&self.buf[self.read..], &self.buf[..self.len - tail])
        }
    }

    /// Copy of every live byte in logical order. Does not consume.
    pub fn peek(&self) -> Vec<u8> {
        let (a, b) = self.as_slices();
        let mut out = Vec::with_capacity(self.len);
        out.extend_from_slice(a);
        out.extend_from_slice(b);
        out
    }

    /// Copy up to `out.len()` leading bytes into `out`; returns how many.
    pub fn copy_prefix(&self, out: &mut [u8]) -> usize {
        let (a, b) = self.as_slices();
        let from_a = a.len().min(out.len());
        out[..from_a].copy_from_slice(&a[..from_a]);
        let from_b = b.len().min(out.len() - from_a);
        out[from_a..from_a + from_b].copy_from_slice(&b[..from_b]);
        from_a + from_b
    }

    /// Drop `n` bytes from the front.
    ///
    /// Returns `false` and leaves the buffer untouched if fewer than `n`
    /// bytes are held.
    pub fn consume(&mut self, n: usize) -> bool {
        if n > self.len {
            return false;
        }
        self.len -= n;
        if self.len == 0 {
            self.clear();
        } else {
            self.read = (self.read + n) % self.capacity();
        }
        true
    }

    /// One `recv(2)` of up to `RECV_CHUNK` bytes, appended to the buffer.
    pub fn receive_from(&mut self, fd: RawFd) -> io::Result<IoStatus> {
        let mut chunk = [0u8; RECV_CHUNK];
        let ret = unsafe { libc::recv(fd, chunk.as_mut_ptr() as *mut libc::c_void, chunk.len(), 0) };
        match cvt_size(ret) {
            Ok(0) => Ok(IoStatus::Closed),
            Ok(n) => {
                self.write(&chunk[..n]);
                Ok(IoStatus::Progress(n))
            }
            Err(e) if is_transient(&e) => Ok(IoStatus::WouldBlock),
            Err(e) => Err(e),
        }
    }

    /// Flush as much as the socket takes in one `sendmsg(2)`.
    ///
    /// Both halves of a wrapped buffer go out in the same call. Whatever
    /// the kernel did not accept stays in the buffer, in order.
    /// `MSG_NOSIGNAL` turns a dead peer into `EPIPE` instead of `SIGPIPE`.
    pub fn send_to(&mut self, fd: RawFd) -> io::Result<IoStatus> {
        if self.is_empty() {
            return Ok(IoStatus::Progress(0));
        }
        let (a, b) = self.as_slices();
        let mut iov = [
            libc::iovec { iov_base: a.as_ptr() as *mut libc::c_void, iov_len: a.len() },
            libc::iovec { iov_base: b.as_ptr() as *mut libc::c_void, iov_len: b.len() },
        ];
        let count = if b.is_empty() { 1 } else { 2 };

        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_iov = iov.as_mut_ptr();
        msg.msg_iovlen = count as _;

        let ret = unsafe { libc::sendmsg(fd, &msg, libc::MSG_NOSIGNAL) };
        match cvt_size(ret) {
            Ok(0) => Err(io::Error::new(io::ErrorKind::WriteZero, "send wrote zero bytes")),
            Ok(n) => {
                self.consume(n);
                Ok(IoStatus::Progress(n))
            }
            Err(e) if is_transient(&e) => Ok(IoStatus::WouldBlock),
            Err(e) => Err(e),
        }
    }
}

#[inline]
fn is_transient(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("read", &self.read)
            .field("write", &self.write)
            .field("len", &self.len)
            .finish()
    }
}
