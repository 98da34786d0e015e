//! Shared types for streamctl.
//!
//! Plain data exchanged between the protocol layer, the session manager and
//! its callers: message discriminators, the error taxonomy and the decoded
//! payloads delivered to callbacks.

use serde::{Deserialize, Serialize};

/// Discriminator carried in the `type` field of every wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Unparseable payload or an unrecognised `type` value.
    Undefined,
    StatusRequest,
    StatusResponse,
    StartRequest,
    StartResponse,
    StartEvent,
    StopRequest,
    StopResponse,
    StopEvent,
    QualityUpdateRequest,
    QualityUpdateResponse,
    ExitRequest,
    /// Reserved by the remote, never sent.
    ExitResponse,
}

impl MessageType {
    /// Every defined message type, excluding `Undefined`.
    pub const ALL: [MessageType; 12] = [
        MessageType::StatusRequest,
        MessageType::StatusResponse,
        MessageType::StartRequest,
        MessageType::StartResponse,
        MessageType::StartEvent,
        MessageType::StopRequest,
        MessageType::StopResponse,
        MessageType::StopEvent,
        MessageType::QualityUpdateRequest,
        MessageType::QualityUpdateResponse,
        MessageType::ExitRequest,
        MessageType::ExitResponse,
    ];

    /// Integer code used on the wire.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            MessageType::Undefined => 0,
            MessageType::StatusRequest => 101,
            MessageType::StatusResponse => 102,
            MessageType::StartRequest => 201,
            MessageType::StartResponse => 202,
            MessageType::StartEvent => 203,
            MessageType::StopRequest => 211,
            MessageType::StopResponse => 212,
            MessageType::StopEvent => 213,
            MessageType::QualityUpdateRequest => 301,
            MessageType::QualityUpdateResponse => 302,
            MessageType::ExitRequest => 901,
            MessageType::ExitResponse => 902,
        }
    }

    /// Map a wire code back to a message type. Unknown codes become `Undefined`.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .unwrap_or(MessageType::Undefined)
    }

    /// Whether the remote sends this message without a matching request.
    #[must_use]
    pub fn is_event(self) -> bool {
        matches!(self, MessageType::StartEvent | MessageType::StopEvent)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Category of a failure reported to a caller's error handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Local or transport failure.
    Connection,
    /// Remote-reported failure of a start request.
    Start,
    /// Remote-reported failure of a stop request.
    Stop,
    /// Any other remote-reported failure.
    Misc,
}

impl ErrorCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Connection => "connection",
            ErrorCategory::Start => "start",
            ErrorCategory::Stop => "stop",
            ErrorCategory::Misc => "misc",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local and transport failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionError {
    /// The target process is not running.
    NoTargetProcess,
    /// The transport could not be initialised (bad endpoint).
    TransportInit,
    /// The connect call failed.
    Connect,
    /// Writing a request failed.
    Send,
    /// The remote closed the connection.
    RemoteClose,
    /// The connection failed underneath us.
    RemoteFail,
    /// Another request is still in flight.
    Busy,
}

impl ConnectionError {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            ConnectionError::NoTargetProcess => 1,
            ConnectionError::TransportInit => 2,
            ConnectionError::Connect => 3,
            ConnectionError::Send => 4,
            ConnectionError::RemoteClose => 5,
            ConnectionError::RemoteFail => 6,
            ConnectionError::Busy => 7,
        }
    }
}

/// Remote-reported start failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StartError {
    Unknown,
    NoUser,
    NotStandbySelf,
    NotStandbyOther,
    UnknownTitle,
    MePageSelectEmpty,
    PrivacySelectEmpty,
    OwnPageSelectEmpty,
    ObsInternal,
    StreamingServiceFacebookLive,
}

impl StartError {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            StartError::Unknown => 0,
            StartError::NoUser => 1,
            StartError::NotStandbySelf => 2,
            StartError::NotStandbyOther => 3,
            StartError::UnknownTitle => 4,
            StartError::MePageSelectEmpty => 5,
            StartError::PrivacySelectEmpty => 6,
            StartError::OwnPageSelectEmpty => 7,
            StartError::ObsInternal => 8,
            StartError::StreamingServiceFacebookLive => 9,
        }
    }
}

/// Remote-reported stop failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopError {
    Unknown,
    NotOnAir,
    TitleMismatch,
}

impl StopError {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            StopError::Unknown => 0,
            StopError::NotOnAir => 1,
            StopError::TitleMismatch => 2,
        }
    }
}

/// A failure delivered to exactly one caller error handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{category} error {code}: {description}")]
pub struct RemoteError {
    pub category: ErrorCategory,
    pub code: i32,
    pub description: String,
}

impl RemoteError {
    #[must_use]
    pub fn new(category: ErrorCategory, code: i32, description: impl Into<String>) -> Self {
        Self {
            category,
            code,
            description: description.into(),
        }
    }

    /// Whether this is the given connection failure.
    #[must_use]
    pub fn is_connection(&self, kind: ConnectionError) -> bool {
        self.category == ErrorCategory::Connection && self.code == kind.code()
    }
}

/// Payload of a successful status response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub status: String,
    pub source_title: String,
    pub user_name: String,
    pub quality: String,
}

/// Unsolicited notification that streaming started.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartEvent {
    /// Title segment of the `source` field.
    pub source_title: String,
    pub user_page: String,
    pub privacy: String,
    pub description: String,
    pub mic: String,
    pub service_provider: String,
    pub stream_url: String,
    pub post_url: String,
}

/// Unsolicited notification that streaming stopped.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopEvent {
    pub source_title: String,
}
