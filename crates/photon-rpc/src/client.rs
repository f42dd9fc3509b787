//! Blocking request/response client.
//!
//! One call in flight at a time: send a framed REQUEST, then read until one
//! whole frame is buffered. Leftover bytes stay in the inbound buffer for
//! the next call. Replies carrying an older id (answers to calls that
//! timed out) are skipped.

use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::time::Duration;

use photon_core::config::ServerConfig;
use photon_net::{codec, IoStatus, RingBuffer};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::envelope::{MessageType, RpcEnvelope};
use crate::error::{Result, RpcError};
use crate::message::{decode_message, encode_message};

pub struct RpcClient {
    stream: TcpStream,
    inbound: RingBuffer,
    next_id: u64,
    timeout: Option<Duration>,
}

impl RpcClient {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            inbound: RingBuffer::new(),
            next_id: 1,
            timeout: None,
        })
    }

    /// Connect to the address a server with `config` would bind.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::connect(config.socket_addr()?)
    }

    /// Bound each send and each wait for response bytes. `None` blocks.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout)?;
        self.stream.set_write_timeout(timeout)?;
        self.timeout = timeout;
        Ok(())
    }

    /// Call `service.method` with an already-serialized request message and
    /// return the serialized response message.
    pub fn call_raw(&mut self, service: &str, method: &str, request: &[u8]) -> Result<Vec<u8>> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        let envelope = RpcEnvelope::request(id, service, method, request.to_vec());
        let frame = codec::encode(&envelope.to_bytes()?)?;
        self.stream.write_all(&frame)?;

        let reply = loop {
            let reply = RpcEnvelope::from_bytes(&self.read_frame()?)?;
            // Unparseable requests are answered with id 0.
            if reply.id == id || (reply.id == 0 && reply.kind == MessageType::Error) {
                break reply;
            }
            // Late answer to a call that already timed out.
            if reply.id != 0 && reply.id < id {
                continue;
            }
            return Err(RpcError::IdMismatch { expected: id, got: reply.id });
        };
        let reply = reply.check_error()?;
        if reply.kind != MessageType::Response {
            return Err(RpcError::BadResponse(format!("unexpected {:?} envelope", reply.kind)));
        }
        Ok(reply.response)
    }

    /// Typed call.
    pub fn call<Req, Resp>(&mut self, service: &str, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = encode_message(request).map_err(|e| RpcError::BadRequest(e.to_string()))?;
        let bytes = self.call_raw(service, method, &payload)?;
        decode_message(&bytes).map_err(|e| RpcError::BadResponse(e.to_string()))
    }

    fn read_frame(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(total) = codec::buffered_frame_len(&self.inbound) {
                let mut frame = self.inbound.peek();
                frame.truncate(total);
                self.inbound.consume(total);
                return Ok(frame.split_off(codec::HEADER_LEN));
            }

            match self.inbound.receive_from(self.stream.as_raw_fd())? {
                IoStatus::Progress(_) => {}
                IoStatus::Closed => return Err(RpcError::ConnectionClosed),
                IoStatus::WouldBlock if self.timeout.is_some() => {
                    return Err(io::Error::from(io::ErrorKind::TimedOut).into());
                }
                IoStatus::WouldBlock => {}
            }
        }
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("peer", &self.stream.peer_addr().ok())
            .field("next_id", &self.next_id)
            .field("buffered", &self.inbound.len())
            .finish()
    }
}
