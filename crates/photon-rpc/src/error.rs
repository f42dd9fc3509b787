//! RPC error types and their wire codes.

use std::fmt;
use std::io;

use photon_core::config::ConfigError;
use photon_net::{FrameTooLarge, NetError};

use crate::envelope::MessageType;

/// Numeric error code carried in ERROR envelopes.
///
/// Stable across releases: peers match on the number, not the text.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Bytes did not parse as an envelope.
    Malformed = 1,
    /// Envelope type was not REQUEST.
    NotARequest = 2,
    EmptyMethod = 3,
    EmptyService = 4,
    ServiceNotFound = 5,
    MethodNotFound = 6,
    /// REQUEST carried no payload bytes.
    EmptyPayload = 7,
    /// Payload did not deserialize into the method's request type.
    BadRequest = 8,
    /// Handler result could not be serialized (or, client side, parsed).
    BadResponse = 9,
    /// The handler itself reported failure.
    Handler = 10,
}

impl ErrorCode {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            1 => ErrorCode::Malformed,
            2 => ErrorCode::NotARequest,
            3 => ErrorCode::EmptyMethod,
            4 => ErrorCode::EmptyService,
            5 => ErrorCode::ServiceNotFound,
            6 => ErrorCode::MethodNotFound,
            7 => ErrorCode::EmptyPayload,
            8 => ErrorCode::BadRequest,
            9 => ErrorCode::BadResponse,
            10 => ErrorCode::Handler,
            _ => return None,
        })
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.as_u32())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    // Protocol errors: answered with an ERROR envelope.
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("expected a REQUEST envelope, got {0:?}")]
    NotARequest(MessageType),
    #[error("empty method name")]
    EmptyMethod,
    #[error("empty service name")]
    EmptyService,
    #[error("service not found: {0}")]
    ServiceNotFound(String),
    #[error("method not found: {service}.{method}")]
    MethodNotFound { service: String, method: String },
    #[error("empty request payload")]
    EmptyPayload,
    #[error("cannot decode request: {0}")]
    BadRequest(String),
    #[error("cannot encode or decode response: {0}")]
    BadResponse(String),
    #[error("handler failed: {0}")]
    Handler(String),

    // Client side.
    /// The peer answered with an ERROR envelope.
    #[error("remote error {code}: {text}")]
    Remote { code: u32, text: String },
    #[error("response id {got} does not match request id {expected}")]
    IdMismatch { expected: u64, got: u64 },
    #[error("connection closed before a full response arrived")]
    ConnectionClosed,
    #[error("cannot encode envelope: {0}")]
    Encode(#[source] postcard::Error),

    #[error(transparent)]
    Frame(#[from] FrameTooLarge),
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RpcError {
    /// Wire code for errors that are reported back to the caller.
    pub fn code(&self) -> Option<ErrorCode> {
        Some(match self {
            RpcError::Malformed(_) => ErrorCode::Malformed,
            RpcError::NotARequest(_) => ErrorCode::NotARequest,
            RpcError::EmptyMethod => ErrorCode::EmptyMethod,
            RpcError::EmptyService => ErrorCode::EmptyService,
            RpcError::ServiceNotFound(_) => ErrorCode::ServiceNotFound,
            RpcError::MethodNotFound { .. } => ErrorCode::MethodNotFound,
            RpcError::EmptyPayload => ErrorCode::EmptyPayload,
            RpcError::BadRequest(_) => ErrorCode::BadRequest,
            RpcError::BadResponse(_) => ErrorCode::BadResponse,
            RpcError::Handler(_) => ErrorCode::Handler,
            RpcError::Remote { code, .. } => return ErrorCode::from_u32(*code),
            _ => return None,
        })
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for v in 1..=10 {
            let code = ErrorCode::from_u32(v).unwrap();
            assert_eq!(code.as_u32(), v);
        }
        assert_eq!(ErrorCode::from_u32(0), None);
        assert_eq!(ErrorCode::from_u32(11), None);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(RpcError::EmptyPayload.code(), Some(ErrorCode::EmptyPayload));
        assert_eq!(
            RpcError::Remote { code: 5, text: String::new() }.code(),
            Some(ErrorCode::ServiceNotFound)
        );
        assert_eq!(RpcError::ConnectionClosed.code(), None);
        assert_eq!(
            RpcError::MethodNotFound { service: "Calc".into(), method: "Mul".into() }.to_string(),
            "method not found: Calc.Mul"
        );
    }
}
