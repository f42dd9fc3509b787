//! The RPC envelope carried inside every frame.
//!
//! Field order is the wire order (postcard encodes fields in declaration
//! order, with no names). `kind` is a single byte: 1 = REQUEST,
//! 2 = RESPONSE, 3 = ERROR; any other value makes the envelope malformed.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, Result, RpcError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageType {
    Request = 1,
    Response = 2,
    Error = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown message type {0}")]
pub struct UnknownMessageType(pub u8);

impl TryFrom<u8> for MessageType {
    type Error = UnknownMessageType;

    fn try_from(v: u8) -> std::result::Result<Self, UnknownMessageType> {
        match v {
            1 => Ok(MessageType::Request),
            2 => Ok(MessageType::Response),
            3 => Ok(MessageType::Error),
            other => Err(UnknownMessageType(other)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(t: MessageType) -> u8 {
        t as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub id: u64,
    pub kind: MessageType,
    pub service_name: String,
    /// Request only.
    pub method_name: String,
    /// Serialized request message (REQUEST).
    pub request: Vec<u8>,
    /// Serialized response message (RESPONSE).
    pub response: Vec<u8>,
    /// `ErrorCode` value (ERROR), 0 otherwise.
    pub error_code: u32,
    /// Human-readable description (ERROR).
    pub error_text: String,
}

impl RpcEnvelope {
    pub fn request(
        id: u64,
        service: impl Into<String>,
        method: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id,
            kind: MessageType::Request,
            service_name: service.into(),
            method_name: method.into(),
            request: payload,
            response: Vec::new(),
            error_code: 0,
            error_text: String::new(),
        }
    }

    pub fn response(id: u64, payload: Vec<u8>) -> Self {
        Self {
            id,
            kind: MessageType::Response,
            service_name: String::new(),
            method_name: String::new(),
            request: Vec::new(),
            response: payload,
            error_code: 0,
            error_text: String::new(),
        }
    }

    /// ERROR envelope describing `err`. Errors without a wire code are
    /// reported as `Handler`.
    pub fn error(id: u64, err: &RpcError) -> Self {
        Self {
            id,
            kind: MessageType::Error,
            service_name: String::new(),
            method_name: String::new(),
            request: Vec::new(),
            response: Vec::new(),
            error_code: err.code().unwrap_or(ErrorCode::Handler).as_u32(),
            error_text: err.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(RpcError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        postcard::from_bytes(bytes).map_err(|e| RpcError::Malformed(e.to_string()))
    }

    /// `Err(RpcError::Remote)` for an ERROR envelope, `Ok(self)` otherwise.
    pub fn check_error(self) -> Result<Self> {
        if self.kind == MessageType::Error {
            return Err(RpcError::Remote {
                code: self.error_code,
                text: self.error_text,
            });
        }
        Ok(self)
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_u32(self.error_code)
    }
}
