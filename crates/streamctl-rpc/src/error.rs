//! Error types for the streamctl-rpc crate.

use streamctl_types::{ConnectionError, RemoteError};

use crate::classify;

/// Failures raised by the transport session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Target process is not running")]
    NoTargetProcess,

    #[error("Invalid endpoint: {0}")]
    Init(String),

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Not connected")]
    NotConnected,
}

impl TransportError {
    /// Connection code this failure is reported under.
    #[must_use]
    pub fn code(&self) -> ConnectionError {
        match self {
            TransportError::NoTargetProcess => ConnectionError::NoTargetProcess,
            TransportError::Init(_) => ConnectionError::TransportInit,
            TransportError::Connect(_) => ConnectionError::Connect,
            TransportError::Send(_) | TransportError::NotConnected => ConnectionError::Send,
        }
    }
}

impl From<TransportError> for RemoteError {
    fn from(err: TransportError) -> Self {
        let code = err.code();
        match err {
            TransportError::NoTargetProcess => classify::connection_error(code),
            TransportError::Init(detail)
            | TransportError::Connect(detail)
            | TransportError::Send(detail) => {
                classify::connection_error_with_detail(code, &detail)
            }
            TransportError::NotConnected => {
                classify::connection_error_with_detail(code, "not connected")
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
