//! Length-prefixed framing: `[len: u32][payload: len bytes]`.
//!
//! The length is written in host byte order (`u32::to_ne_bytes`). That is
//! the v1 wire format and what deployed peers expect; it only
//! interoperates between hosts of the same endianness. Switching to a
//! fixed order would be a protocol version change.
//!
//! Decoding never fails. A short header, a short payload or a length
//! field claiming more bytes than are present all mean "no frame yet".

use crate::ring_buffer::RingBuffer;

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Largest payload the 4-byte length field can describe.
pub const MAX_PAYLOAD: usize = u32::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("payload of {0} bytes does not fit a 4-byte length prefix")]
pub struct FrameTooLarge(pub usize);

#[inline]
fn header(payload: &[u8]) -> Result<[u8; HEADER_LEN], FrameTooLarge> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameTooLarge(payload.len()))?;
    Ok(len.to_ne_bytes())
}

/// `header ++ payload` as a fresh buffer.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, FrameTooLarge> {
    let hdr = header(payload)?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&hdr);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Append one frame to `out` without an intermediate allocation.
pub fn encode_into(payload: &[u8], out: &mut RingBuffer) -> Result<(), FrameTooLarge> {
    let hdr = header(payload)?;
    out.write(&hdr);
    out.write(payload);
    Ok(())
}

/// The first frame's payload within `buf[..available]`.
///
/// `available` is clamped to `buf.len()`, so this never reads past the
/// slice. Non-destructive: the caller consumes `HEADER_LEN + payload.len()`
/// bytes after a successful decode. `Some(&[])` is a complete empty frame.
pub fn decode(buf: &[u8], available: usize) -> Option<&[u8]> {
    let buf = &buf[..available.min(buf.len())];
    let hdr: [u8; HEADER_LEN] = buf.get(..HEADER_LEN)?.try_into().ok()?;
    let len = u32::from_ne_bytes(hdr) as usize;
    let end = HEADER_LEN.checked_add(len)?;
    buf.get(HEADER_LEN..end)
}

/// Total size (header included) of the first complete frame in `buf`.
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    decode(buf, buf.len()).map(|payload| HEADER_LEN + payload.len())
}

/// Total size of the first frame in `buf` once all of it is buffered.
///
/// Reads only the header, so polling a half-received large frame costs
/// nothing per readiness event.
pub fn buffered_frame_len(buf: &RingBuffer) -> Option<usize> {
    let mut hdr = [0u8; HEADER_LEN];
    if buf.copy_prefix(&mut hdr) < HEADER_LEN {
        return None;
    }
    let total = HEADER_LEN.checked_add(u32::from_ne_bytes(hdr) as usize)?;
    (buf.len() >= total).then_some(total)
}

/// Iterate the complete frames at the front of `buf`, in order.
///
/// Stops at the first incomplete frame; `consumed()` then tells how many
/// bytes the yielded frames occupied.
pub fn frames(buf: &[u8]) -> Frames<'_> {
    Frames { buf, offset: 0 }
}

pub struct Frames<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Frames<'a> {
    /// Bytes covered by the frames yielded so far.
    pub fn consumed(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let rest = &self.buf[self.offset..];
        let payload = decode(rest, rest.len())?;
        self.offset += HEADER_LEN + payload.len();
        Some(payload)
    }
}
