//! Message persistence seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::message::{ChatPreview, Message, MessageId, UserId};

/// Largest page a conversation listing returns.
pub const MAX_PAGE_LIMIT: usize = 50;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A message with this id already exists.
    #[error("duplicate message id: {0}")]
    Duplicate(MessageId),

    /// The backing store failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Offset/limit window over a conversation, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    offset: usize,
    limit: usize,
}

impl Page {
    /// Create a page. A zero limit means the maximum; larger limits are
    /// clamped to [`MAX_PAGE_LIMIT`].
    #[must_use]
    pub fn new(offset: usize, limit: usize) -> Self {
        let limit = if limit == 0 {
            MAX_PAGE_LIMIT
        } else {
            limit.min(MAX_PAGE_LIMIT)
        };
        Self { offset, limit }
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, MAX_PAGE_LIMIT)
    }
}

/// Durable message storage.
///
/// Implementations must be safe to call concurrently from many
/// connections.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message.
    async fn save_message(&self, message: &Message) -> Result<(), StoreError>;

    /// Mark every unread message from `sender` to `receiver` as read at
    /// `read_at`, in one atomic update. Returns the number of messages
    /// updated.
    async fn mark_read(
        &self,
        sender: UserId,
        receiver: UserId,
        read_at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Messages exchanged between `a` and `b`, ordered oldest to newest.
    ///
    /// The page window is applied newest first, so offset 0 returns the
    /// most recent messages.
    async fn list_conversation(
        &self,
        a: UserId,
        b: UserId,
        page: Page,
    ) -> Result<Vec<Message>, StoreError>;

    /// Record the display name previews are searched by.
    async fn save_user(&self, user: UserId, display_name: &str) -> Result<(), StoreError>;

    /// One preview per counterparty of `user`, filtered by display name.
    ///
    /// An empty filter matches every counterparty. Otherwise the match is
    /// a case-insensitive substring test, and counterparties without a
    /// recorded name never match.
    async fn list_previews(&self, user: UserId, filter: &str)
        -> Result<Vec<ChatPreview>, StoreError>;

    /// Number of unread messages from `sender` to `receiver`.
    async fn count_unread(&self, sender: UserId, receiver: UserId) -> Result<u64, StoreError>;
}
