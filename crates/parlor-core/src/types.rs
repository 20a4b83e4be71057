use crate::protocol::ChatEnvelope;
use chrono::{DateTime, Utc};
use std::fmt;

/// A chat message as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub from: String,
    pub to: String,
    pub body: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// How a message relates to the local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    PublicMine,
    PublicOther,
    PrivateMine,
    PrivateOther,
}

impl MessageClass {
    pub fn is_private(self) -> bool {
        matches!(self, Self::PrivateMine | Self::PrivateOther)
    }

    pub fn is_mine(self) -> bool {
        matches!(self, Self::PublicMine | Self::PrivateMine)
    }
}

impl ChatMessage {
    pub fn from_envelope(envelope: ChatEnvelope) -> Self {
        Self {
            from: envelope.nick,
            to: envelope.to,
            body: envelope.msg,
            timestamp: envelope.timestamp,
        }
    }

    pub fn is_private(&self) -> bool {
        !self.to.is_empty()
    }

    /// Classify against the local identity. A non-empty target makes the
    /// message private; the server-stamped sender decides ownership.
    pub fn classify(&self, local_nick: &str) -> MessageClass {
        let mine = self.from == local_nick;
        match (self.is_private(), mine) {
            (false, true) => MessageClass::PublicMine,
            (false, false) => MessageClass::PublicOther,
            (true, true) => MessageClass::PrivateMine,
            (true, false) => MessageClass::PrivateOther,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Local `shutdown()`.
    Shutdown,
    /// The server closed the connection.
    ServerClosed,
    ReadFailed(String),
    /// The server sent a frame that is not a valid envelope.
    ProtocolViolation(String),
    ReconnectExhausted { attempts: u32 },
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => f.write_str("session shut down"),
            Self::ServerClosed => f.write_str("server closed the connection"),
            Self::ReadFailed(error) => write!(f, "connection lost: {error}"),
            Self::ProtocolViolation(error) => write!(f, "protocol violation: {error}"),
            Self::ReconnectExhausted { attempts } => {
                write!(f, "gave up reconnecting after {attempts} attempts")
            }
        }
    }
}

/// Notifications published to presentation-layer subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    MessageReceived(ChatMessage),
    RosterReplaced { nicks: Vec<String> },
    ContactAdded { nick: String },
    Reconnecting { attempt: u32 },
    Reconnected,
    SessionClosed { reason: CloseReason },
}
