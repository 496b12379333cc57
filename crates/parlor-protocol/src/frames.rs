//! Frame types for the Parlor protocol.
//!
//! Frames are JSON objects exchanged over a text WebSocket. Every frame
//! carries an `event` discriminant; inbound frames are sent by clients,
//! outbound frames by the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound event tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InboundEvent {
    /// Send a message to the currently joined conversation.
    #[serde(rename = "MSG")]
    Msg,
    /// Open the conversation with the user id carried in `content`.
    #[serde(rename = "JOIN")]
    Join,
    /// Close the currently open conversation.
    #[serde(rename = "LEFT")]
    Left,
    /// Any tag this server does not understand.
    #[serde(other)]
    Unknown,
}

impl InboundEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            InboundEvent::Msg => "MSG",
            InboundEvent::Join => "JOIN",
            InboundEvent::Left => "LEFT",
            InboundEvent::Unknown => "UNKNOWN",
        }
    }
}

/// A frame sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Event tag.
    pub event: InboundEvent,
    /// Message text for `MSG`, target user id for `JOIN`.
    #[serde(default)]
    pub content: String,
    /// Client correlation tag, echoed back on `MSG` confirmations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Client-side send time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl InboundFrame {
    /// Create a `MSG` frame.
    #[must_use]
    pub fn msg(content: impl Into<String>) -> Self {
        Self {
            event: InboundEvent::Msg,
            content: content.into(),
            tag: None,
            sent_at: None,
        }
    }

    /// Create a `JOIN` frame targeting `user_id`.
    #[must_use]
    pub fn join(user_id: Uuid) -> Self {
        Self {
            event: InboundEvent::Join,
            content: user_id.to_string(),
            tag: None,
            sent_at: None,
        }
    }

    /// Create a `LEFT` frame.
    #[must_use]
    pub fn left() -> Self {
        Self {
            event: InboundEvent::Left,
            content: String::new(),
            tag: None,
            sent_at: None,
        }
    }

    /// Attach a correlation tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Attach a client send time.
    #[must_use]
    pub fn with_sent_at(mut self, sent_at: DateTime<Utc>) -> Self {
        self.sent_at = Some(sent_at);
        self
    }
}

/// Business reference attached to a message.
///
/// At most one field is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreement_id: Option<Uuid>,
}

/// A chat message as seen by one of its two participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Message identifier.
    pub message_id: Uuid,
    /// The other participant, from the recipient's perspective.
    pub chat_id: Uuid,
    /// Message text.
    pub content: String,
    /// Attached business reference.
    #[serde(default)]
    pub attachment: AttachmentPayload,
    /// When the receiver read the message.
    pub read_at: Option<DateTime<Utc>>,
    /// When the message was sent.
    pub sent_at: DateTime<Utc>,
    /// Whether the recipient of this frame wrote the message.
    pub author: bool,
}

/// Read receipt for every message `sender_id` sent to `receiver_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub read_at: DateTime<Utc>,
}

/// Chat list bump for the conversation with `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBump {
    pub user_id: Uuid,
    pub unread_messages: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Error description shared by error frames and fatal close reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// HTTP-style status code.
    pub code: u16,
    /// Stable machine-readable name, e.g. `bad-request`.
    pub name: String,
    /// Human-readable detail.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl ErrorBody {
    /// Create a new error body.
    #[must_use]
    pub fn new(code: u16, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Payload of a fatal close frame: `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalError {
    pub error: ErrorBody,
}

/// A frame sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum OutboundFrame {
    /// A full chat message.
    #[serde(rename = "MSG")]
    Message {
        /// Correlation tag of the client send being confirmed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
        #[serde(flatten)]
        message: MessagePayload,
    },

    /// Messages were read.
    #[serde(rename = "READ")]
    Read(ReadReceipt),

    /// Chat list preview bump.
    #[serde(rename = "CHATS")]
    Chats(ChatBump),

    /// Connection established.
    #[serde(rename = "CONN")]
    Connected,

    /// Recoverable error; the connection stays open.
    #[serde(rename = "ERROR")]
    Error(ErrorBody),
}

impl OutboundFrame {
    /// Create a `MSG` frame.
    #[must_use]
    pub fn message(message: MessagePayload, tag: Option<String>) -> Self {
        OutboundFrame::Message { tag, message }
    }

    /// Create a `READ` frame.
    #[must_use]
    pub fn read(sender_id: Uuid, receiver_id: Uuid, read_at: DateTime<Utc>) -> Self {
        OutboundFrame::Read(ReadReceipt {
            sender_id,
            receiver_id,
            read_at,
        })
    }

    /// Create a `CHATS` frame.
    #[must_use]
    pub fn chats(user_id: Uuid, unread_messages: u64, content: Option<String>) -> Self {
        OutboundFrame::Chats(ChatBump {
            user_id,
            unread_messages,
            content,
        })
    }

    /// Wire name of the event.
    #[must_use]
    pub fn event(&self) -> &'static str {
        match self {
            OutboundFrame::Message { .. } => "MSG",
            OutboundFrame::Read(_) => "READ",
            OutboundFrame::Chats(_) => "CHATS",
            OutboundFrame::Connected => "CONN",
            OutboundFrame::Error(_) => "ERROR",
        }
    }
}
