//! Chat message types.

use chrono::{DateTime, Utc};
use parlor_protocol::{AttachmentPayload, MessagePayload};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ChatError;

/// A user identifier.
pub type UserId = Uuid;

/// A message identifier.
pub type MessageId = Uuid;

/// Business reference carried by a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Attachment {
    /// Plain text message.
    #[default]
    None,
    /// Refers to an appointment.
    Appointment(Uuid),
    /// Refers to an agreement.
    Agreement(Uuid),
}

impl Attachment {
    /// Whether no reference is attached.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Attachment::None)
    }

    /// Wire representation.
    #[must_use]
    pub fn to_payload(&self) -> AttachmentPayload {
        match *self {
            Attachment::None => AttachmentPayload::default(),
            Attachment::Appointment(id) => AttachmentPayload {
                appointment_id: Some(id),
                agreement_id: None,
            },
            Attachment::Agreement(id) => AttachmentPayload {
                appointment_id: None,
                agreement_id: Some(id),
            },
        }
    }
}

/// The unordered pair of users in a 1:1 conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    low: UserId,
    high: UserId,
}

impl ConversationKey {
    /// Create a key; argument order does not matter.
    #[must_use]
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// Check if a user takes part in the conversation.
    #[must_use]
    pub fn contains(&self, user: UserId) -> bool {
        self.low == user || self.high == user
    }

    /// The participant that is not `user`.
    #[must_use]
    pub fn other(&self, user: UserId) -> UserId {
        if self.low == user {
            self.high
        } else {
            self.low
        }
    }
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub attachment: Attachment,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a new unread message sent now.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::SelfConversation`] if sender and receiver are
    /// the same user.
    pub fn new(
        sender_id: UserId,
        receiver_id: UserId,
        content: impl Into<String>,
    ) -> Result<Self, ChatError> {
        if sender_id == receiver_id {
            return Err(ChatError::SelfConversation);
        }

        Ok(Self {
            id: Uuid::now_v7(),
            sender_id,
            receiver_id,
            content: content.into(),
            attachment: Attachment::None,
            sent_at: Utc::now(),
            read_at: None,
        })
    }

    /// Set the attachment.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = attachment;
        self
    }

    /// Set the send time.
    #[must_use]
    pub fn with_sent_at(mut self, sent_at: DateTime<Utc>) -> Self {
        self.sent_at = sent_at;
        self
    }

    /// Mark the message read.
    ///
    /// The read time is set at most once and never precedes `sent_at`.
    /// Returns `true` if this call set it.
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.read_at.is_some() {
            return false;
        }
        self.read_at = Some(at.max(self.sent_at));
        true
    }

    /// Check if the message has been read.
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    /// The conversation this message belongs to.
    #[must_use]
    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::new(self.sender_id, self.receiver_id)
    }

    /// The message as seen by `viewer`, one of its participants.
    #[must_use]
    pub fn payload_for(&self, viewer: UserId) -> MessagePayload {
        let author = viewer == self.sender_id;
        MessagePayload {
            message_id: self.id,
            chat_id: if author {
                self.receiver_id
            } else {
                self.sender_id
            },
            content: self.content.clone(),
            attachment: self.attachment.to_payload(),
            read_at: self.read_at,
            sent_at: self.sent_at,
            author,
        }
    }
}

/// Per-counterparty chat list row, derived from the message history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatPreview {
    /// The counterparty.
    pub user_id: UserId,
    /// Counterparty display name, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Latest message text.
    pub content: Option<String>,
    /// Latest message time.
    pub sent_at: Option<DateTime<Utc>>,
    /// Messages from the counterparty the viewer has not read.
    pub unread_messages: u64,
}
