//! Wire codec for the chat protocol.
//!
//! Every frame after the identity handshake is a JSON text frame carrying a
//! [`ChatEnvelope`]. The field the server switches on is serialized as
//! `type`; `kind` is accepted on decode for servers that spell it that way,
//! and `type` wins when a frame carries both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode envelope: {0}")]
    Encode(serde_json::Error),

    #[error("malformed envelope: {0}")]
    Envelope(serde_json::Error),

    #[error("malformed envelope: expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("malformed contact list payload: {0}")]
    ContactList(serde_json::Error),
}

/// Envelope discriminator.
///
/// Unknown values decode to [`EnvelopeKind::Other`] rather than failing so a
/// newer server can add kinds without breaking older clients.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnvelopeKind {
    #[default]
    Message,
    AddContact,
    RemoveContact,
    GetContactList,
    ContactList,
    Other(String),
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "msg",
            Self::AddContact => "add_contact",
            Self::RemoveContact => "remove_contact",
            Self::GetContactList => "get_contact",
            Self::ContactList => "contact_list",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for EnvelopeKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "" | "msg" => Self::Message,
            "add_contact" => Self::AddContact,
            "remove_contact" => Self::RemoveContact,
            "get_contact" => Self::GetContactList,
            "contact_list" => Self::ContactList,
            _ => Self::Other(raw),
        }
    }
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EnvelopeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EnvelopeKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map_or(Self::Message, Self::from))
    }
}

/// The unit exchanged with the server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "WireEnvelope")]
pub struct ChatEnvelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Sender identity, stamped by the server on inbound messages.
    pub nick: String,
    /// Empty for public messages. Also carries the contact nick on
    /// server-originated `add_contact` envelopes.
    pub to: String,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Decode-side shape of an envelope. Every field is optional; when a frame
/// carries both `type` and `kind`, `type` wins.
#[derive(Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type", default)]
    kind: Option<EnvelopeKind>,
    #[serde(rename = "kind", default)]
    legacy_kind: Option<EnvelopeKind>,
    #[serde(default, deserialize_with = "null_as_empty")]
    nick: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    to: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    msg: String,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    timestamp: Option<DateTime<Utc>>,
}

impl From<WireEnvelope> for ChatEnvelope {
    fn from(wire: WireEnvelope) -> Self {
        Self {
            kind: wire.kind.or(wire.legacy_kind).unwrap_or_default(),
            nick: wire.nick,
            to: wire.to,
            msg: wire.msg,
            timestamp: wire.timestamp,
        }
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Unix seconds of `0001-01-01T00:00:00Z`, the instant servers send for an
/// unset time.
const ZERO_INSTANT_SECS: i64 = -62_135_596_800;

/// The zero instant decodes as an absent timestamp; every other instant,
/// including others in year 1, is kept.
fn deserialize_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let timestamp = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(timestamp.filter(|ts| Some(*ts) != DateTime::from_timestamp(ZERO_INSTANT_SECS, 0)))
}

/// Outbound intents issued by the local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    PublicMessage { text: String },
    PrivateMessage { text: String, to: String },
    AddContact { nick: String },
    RequestRoster { identity: String },
}

impl Intent {
    pub fn into_envelope(self) -> ChatEnvelope {
        match self {
            Self::PublicMessage { text } => ChatEnvelope {
                kind: EnvelopeKind::Message,
                msg: text,
                ..ChatEnvelope::default()
            },
            Self::PrivateMessage { text, to } => ChatEnvelope {
                kind: EnvelopeKind::Message,
                to,
                msg: text,
                ..ChatEnvelope::default()
            },
            // The nick travels in `msg` outbound; the server echoes it back in `to`.
            Self::AddContact { nick } => ChatEnvelope {
                kind: EnvelopeKind::AddContact,
                msg: nick,
                ..ChatEnvelope::default()
            },
            Self::RequestRoster { identity } => ChatEnvelope {
                kind: EnvelopeKind::GetContactList,
                nick: identity,
                ..ChatEnvelope::default()
            },
        }
    }
}

pub fn encode(intent: &Intent) -> Result<String, CodecError> {
    encode_envelope(&intent.clone().into_envelope())
}

pub fn encode_envelope(envelope: &ChatEnvelope) -> Result<String, CodecError> {
    serde_json::to_string(envelope).map_err(CodecError::Encode)
}

/// Decode one text frame into an envelope.
///
/// The frame must be a JSON object; every field is optional.
pub fn decode(frame: &str) -> Result<ChatEnvelope, CodecError> {
    envelope_from_value(serde_json::from_str(frame).map_err(CodecError::Envelope)?)
}

/// Same as [`decode`] for frames that arrive as raw bytes.
pub fn decode_bytes(frame: &[u8]) -> Result<ChatEnvelope, CodecError> {
    envelope_from_value(serde_json::from_slice(frame).map_err(CodecError::Envelope)?)
}

fn envelope_from_value(value: Value) -> Result<ChatEnvelope, CodecError> {
    if !value.is_object() {
        return Err(CodecError::NotAnObject(json_type_name(&value)));
    }
    serde_json::from_value(value).map_err(CodecError::Envelope)
}

/// Decode the nested nick array carried in a `contact_list` body.
pub fn decode_contact_list(body: &str) -> Result<Vec<String>, CodecError> {
    serde_json::from_str(body).map_err(CodecError::ContactList)
}

/// Inverse of [`decode_contact_list`], used by servers and test fixtures.
pub fn encode_contact_list(nicks: &[String]) -> Result<String, CodecError> {
    serde_json::to_string(nicks).map_err(CodecError::Encode)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
