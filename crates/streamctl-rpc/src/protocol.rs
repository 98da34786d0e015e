//! Wire protocol for the streaming application's remote-control channel.
//!
//! Every frame is a compact JSON object with an integer `type` discriminator
//! and a flat set of string fields:
//!
//! ```text
//! {"type":201,"title":"My Game"}
//! ```
//!
//! [`Message`] is the untyped unit that crosses the wire. [`Request`] builds
//! outbound messages and [`Inbound`] validates inbound ones.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use streamctl_types::{MessageType, StartEvent, StatusInfo, StopEvent};

/// Name of the discriminator field.
pub const TYPE_FIELD: &str = "type";

/// Separator between the title and the suffix of a `source` field.
pub const SOURCE_SEPARATOR: char = ':';

/// Named string fields of a message, ordered for stable encoding.
pub type Fields = BTreeMap<String, String>;

/// A decoded or to-be-encoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub fields: Fields,
}

impl Message {
    #[must_use]
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            fields: Fields::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        self.kind == MessageType::Undefined
    }

    /// Serialize to the compact wire form.
    ///
    /// A field named `type` is shadowed by the discriminator.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut object = Map::new();
        for (name, value) in &self.fields {
            object.insert(name.clone(), Value::String(value.clone()));
        }
        object.insert(TYPE_FIELD.to_string(), Value::from(self.kind.code()));
        Value::Object(object).to_string()
    }

    /// Parse a wire payload.
    ///
    /// Never fails: malformed JSON, a non-object payload or a missing or
    /// unrecognised `type` all produce a message of kind
    /// [`MessageType::Undefined`]. Numbers and booleans are kept as their
    /// textual form; nulls, arrays and nested objects are skipped.
    #[must_use]
    pub fn decode(payload: &str) -> Self {
        let Ok(Value::Object(object)) = serde_json::from_str::<Value>(payload) else {
            return Self::new(MessageType::Undefined);
        };

        let kind = object
            .get(TYPE_FIELD)
            .and_then(type_code)
            .map_or(MessageType::Undefined, MessageType::from_code);

        let fields = object
            .into_iter()
            .filter(|(name, _)| name != TYPE_FIELD)
            .filter_map(|(name, value)| field_text(value).map(|text| (name, text)))
            .collect();

        Self { kind, fields }
    }
}

fn type_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn field_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Title segment of a `title:suffix` source value.
///
/// Only the part before the first separator names the title; the suffix is
/// opaque. A value without a separator is returned whole.
#[must_use]
pub fn source_title(source: &str) -> &str {
    source
        .split_once(SOURCE_SEPARATOR)
        .map_or(source, |(title, _)| title)
}

/// Requests the session can issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Status,
    Start { title: String },
    Stop { title: String },
    QualityUpdate { quality: String },
    Exit,
}

impl Request {
    #[must_use]
    pub fn kind(&self) -> MessageType {
        match self {
            Request::Status => MessageType::StatusRequest,
            Request::Start { .. } => MessageType::StartRequest,
            Request::Stop { .. } => MessageType::StopRequest,
            Request::QualityUpdate { .. } => MessageType::QualityUpdateRequest,
            Request::Exit => MessageType::ExitRequest,
        }
    }

    #[must_use]
    pub fn to_message(&self) -> Message {
        let message = Message::new(self.kind());
        match self {
            Request::Status | Request::Exit => message,
            Request::Start { title } | Request::Stop { title } => {
                message.with_field("title", title.as_str())
            }
            Request::QualityUpdate { quality } => message.with_field("quality", quality.as_str()),
        }
    }

    #[must_use]
    pub fn encode(&self) -> String {
        self.to_message().encode()
    }
}

/// Outcome carried by a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    Success(T),
    /// Remote error identifier, never empty.
    Error(String),
}

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    StatusResponse(Reply<StatusInfo>),
    StartResponse(Reply<()>),
    StopResponse(Reply<()>),
    QualityUpdateResponse(Reply<()>),
    StartEvent(StartEvent),
    StopEvent(StopEvent),
    /// A well-formed message of a type the session never receives.
    Unexpected(MessageType),
}

impl Inbound {
    /// Validate the fields a message of its type must carry.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] when a required field is
    /// absent, or empty where emptiness is meaningless (`status`,
    /// `quality`, `source`).
    pub fn parse(message: &Message) -> Result<Self, ProtocolError> {
        let fields = FieldReader::new(message);
        let inbound = match message.kind {
            MessageType::StatusResponse => {
                Inbound::StatusResponse(fields.reply(|fields| {
                    Ok(StatusInfo {
                        status: fields.non_empty("status")?,
                        source_title: fields.required("sourceTitle")?,
                        user_name: fields.required("userName")?,
                        quality: fields.non_empty("quality")?,
                    })
                })?)
            }
            MessageType::StartResponse => Inbound::StartResponse(fields.reply(|_| Ok(()))?),
            MessageType::StopResponse => Inbound::StopResponse(fields.reply(|_| Ok(()))?),
            MessageType::QualityUpdateResponse => {
                Inbound::QualityUpdateResponse(fields.reply(|_| Ok(()))?)
            }
            MessageType::StartEvent => {
                let source = fields.non_empty("source")?;
                Inbound::StartEvent(StartEvent {
                    source_title: source_title(&source).to_string(),
                    user_page: fields.required("userPage")?,
                    privacy: fields.required("privacy")?,
                    description: fields.required("description")?,
                    mic: fields.required("mic")?,
                    service_provider: fields.required("serviceProvider")?,
                    stream_url: fields.required("streamUrl")?,
                    post_url: fields.required("postUrl")?,
                })
            }
            MessageType::StopEvent => {
                let source = fields.non_empty("source")?;
                Inbound::StopEvent(StopEvent {
                    source_title: source_title(&source).to_string(),
                })
            }
            other => Inbound::Unexpected(other),
        };
        Ok(inbound)
    }
}

struct FieldReader<'a> {
    message: &'a Message,
}

impl<'a> FieldReader<'a> {
    fn new(message: &'a Message) -> Self {
        Self { message }
    }

    fn required(&self, name: &'static str) -> Result<String, ProtocolError> {
        self.message
            .field(name)
            .map(str::to_string)
            .ok_or(ProtocolError::MissingField {
                kind: self.message.kind,
                field: name,
            })
    }

    fn non_empty(&self, name: &'static str) -> Result<String, ProtocolError> {
        let value = self.required(name)?;
        if value.is_empty() {
            return Err(ProtocolError::MissingField {
                kind: self.message.kind,
                field: name,
            });
        }
        Ok(value)
    }

    /// A non-empty `error` field wins over the success payload.
    fn reply<T>(
        &self,
        success: impl FnOnce(&Self) -> Result<T, ProtocolError>,
    ) -> Result<Reply<T>, ProtocolError> {
        match self.message.field("error") {
            Some(error) if !error.is_empty() => Ok(Reply::Error(error.to_string())),
            _ => success(self).map(Reply::Success),
        }
    }
}

/// Errors raised while validating inbound messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("{kind} is missing required field '{field}'")]
    MissingField {
        kind: MessageType,
        field: &'static str,
    },
}
