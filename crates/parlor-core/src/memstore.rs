//! In-memory message store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::message::{ChatPreview, ConversationKey, Message, MessageId, UserId};
use crate::store::{MessageStore, Page, StoreError};

/// A [`MessageStore`] kept in process memory.
///
/// Also holds a display-name directory that the preview search filters
/// on.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<Message>>,
    names: RwLock<HashMap<UserId, String>>,
}

impl InMemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a stored message.
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<Message> {
        self.messages.read().iter().find(|m| m.id == id).cloned()
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn save_message(&self, message: &Message) -> Result<(), StoreError> {
        let mut messages = self.messages.write();
        if messages.iter().any(|m| m.id == message.id) {
            return Err(StoreError::Duplicate(message.id));
        }
        messages.push(message.clone());
        Ok(())
    }

    async fn mark_read(
        &self,
        sender: UserId,
        receiver: UserId,
        read_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut messages = self.messages.write();
        let updated = messages
            .iter_mut()
            .filter(|m| m.sender_id == sender && m.receiver_id == receiver)
            .map(|m| m.mark_read(read_at))
            .filter(|updated| *updated)
            .count();
        Ok(updated as u64)
    }

    async fn list_conversation(
        &self,
        a: UserId,
        b: UserId,
        page: Page,
    ) -> Result<Vec<Message>, StoreError> {
        let key = ConversationKey::new(a, b);
        let messages = self.messages.read();
        let mut conversation: Vec<&Message> = messages
            .iter()
            .filter(|m| m.conversation() == key)
            .collect();

        // Newest first for windowing, then back to chronological order
        conversation.sort_by(|x, y| y.sent_at.cmp(&x.sent_at).then(y.id.cmp(&x.id)));
        let mut window: Vec<Message> = conversation
            .into_iter()
            .skip(page.offset())
            .take(page.limit())
            .cloned()
            .collect();
        window.reverse();
        Ok(window)
    }

    async fn save_user(&self, user: UserId, display_name: &str) -> Result<(), StoreError> {
        self.names.write().insert(user, display_name.to_string());
        Ok(())
    }

    async fn list_previews(
        &self,
        user: UserId,
        filter: &str,
    ) -> Result<Vec<ChatPreview>, StoreError> {
        let messages = self.messages.read();
        let mut latest: HashMap<UserId, &Message> = HashMap::new();
        let mut unread: HashMap<UserId, u64> = HashMap::new();

        for message in messages.iter() {
            let conversation = message.conversation();
            if !conversation.contains(user) {
                continue;
            }
            let peer = conversation.other(user);

            if message.receiver_id == user && !message.is_read() {
                *unread.entry(peer).or_default() += 1;
            }

            latest
                .entry(peer)
                .and_modify(|current| {
                    if (message.sent_at, message.id) > (current.sent_at, current.id) {
                        *current = message;
                    }
                })
                .or_insert(message);
        }

        let names = self.names.read();
        let needle = filter.to_lowercase();
        let mut previews: Vec<ChatPreview> = latest
            .into_iter()
            .filter(|(peer, _)| {
                needle.is_empty()
                    || names
                        .get(peer)
                        .is_some_and(|name| name.to_lowercase().contains(&needle))
            })
            .map(|(peer, message)| ChatPreview {
                user_id: peer,
                display_name: names.get(&peer).cloned(),
                content: Some(message.content.clone()),
                sent_at: Some(message.sent_at),
                unread_messages: unread.get(&peer).copied().unwrap_or(0),
            })
            .collect();

        previews.sort_by(|x, y| {
            y.unread_messages
                .cmp(&x.unread_messages)
                .then(y.sent_at.cmp(&x.sent_at))
        });
        Ok(previews)
    }

    async fn count_unread(&self, sender: UserId, receiver: UserId) -> Result<u64, StoreError> {
        let count = self
            .messages
            .read()
            .iter()
            .filter(|m| m.sender_id == sender && m.receiver_id == receiver && !m.is_read())
            .count();
        Ok(count as u64)
    }
}
