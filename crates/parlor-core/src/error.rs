//! Error taxonomy for chat operations.

use parlor_protocol::{ErrorBody, OutboundFrame, ProtocolError};
use thiserror::Error;

use crate::auth::AuthError;
use crate::queue::QueueError;
use crate::store::StoreError;

/// Broad error classes, deciding how an error is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the client. Reported, connection stays open.
    Protocol,
    /// Failed session validation. Fatal.
    Authorization,
    /// Message store failure. Reported and logged as a server fault.
    Persistence,
    /// The connection is gone. Not reported.
    Transport,
}

/// Chat errors.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Frame could not be decoded.
    #[error("could not parse json")]
    Malformed(#[from] ProtocolError),

    /// A user id in a frame did not parse.
    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    /// Sender and receiver are the same user.
    #[error("could not chat with yourself")]
    SelfConversation,

    /// `MSG` arrived before any `JOIN`.
    #[error("no conversation joined, send JOIN first")]
    NoActiveConversation,

    /// A notification was published without a business reference.
    #[error("notification message requires an appointment or agreement attachment")]
    MissingAttachment,

    /// Session validation failed.
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    /// The message store failed.
    #[error("{context}")]
    Persistence {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    /// The connection's outbound queue is closed.
    #[error("connection closed")]
    Closed(#[from] QueueError),
}

impl ChatError {
    /// Wrap a store failure with a client-facing description.
    #[must_use]
    pub fn persistence(context: &'static str, source: StoreError) -> Self {
        ChatError::Persistence { context, source }
    }

    /// The error class.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::Malformed(_)
            | ChatError::InvalidUserId(_)
            | ChatError::SelfConversation
            | ChatError::NoActiveConversation
            | ChatError::MissingAttachment => ErrorKind::Protocol,
            ChatError::Unauthorized(_) => ErrorKind::Authorization,
            ChatError::Persistence { .. } => ErrorKind::Persistence,
            ChatError::Closed(_) => ErrorKind::Transport,
        }
    }

    /// HTTP-style status code.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Protocol => 400,
            ErrorKind::Authorization => 401,
            ErrorKind::Persistence | ErrorKind::Transport => 500,
        }
    }

    /// Stable machine-readable name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ChatError::Malformed(_) => "bad-request",
            ChatError::InvalidUserId(_) => "invalid-user-id",
            ChatError::SelfConversation => "self-conversation",
            ChatError::NoActiveConversation => "no-active-conversation",
            ChatError::MissingAttachment => "unsupported-attachment",
            ChatError::Unauthorized(_) => "unauthorized",
            ChatError::Persistence { .. } | ChatError::Closed(_) => "internal-server-error",
        }
    }

    /// Error description for the wire.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.code(), self.name(), self.to_string())
    }

    /// Recoverable error frame for the wire.
    #[must_use]
    pub fn to_frame(&self) -> OutboundFrame {
        OutboundFrame::Error(self.to_body())
    }
}
