//! Wire protocol and transport for talking to the streaming application.
//!
//! # Architecture
//!
//! - [`protocol`]: JSON message codec plus typed outbound requests and
//!   validated inbound messages
//! - [`classify`]: lookup tables turning local failures and remote error
//!   identifiers into [`RemoteError`] values
//! - [`transport`]: WebSocket connection owner with stale-event filtering
//! - [`error`]: transport error type and `Result` alias

pub mod classify;
pub mod error;
pub mod protocol;
pub mod transport;

pub use error::{Result, TransportError};

pub use protocol::{Fields, Inbound, Message, ProtocolError, Reply, Request, source_title};

pub use transport::{
    AlwaysPresent, ConnectionId, DEFAULT_PORT, Presence, Transport, TransportEvent, endpoint_url,
};

// Re-export commonly used data types from streamctl-types
pub use streamctl_types::{
    ConnectionError, ErrorCategory, MessageType, RemoteError, StartError, StartEvent, StatusInfo,
    StopError, StopEvent,
};
