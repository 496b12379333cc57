//! System notification messages.
//!
//! Other subsystems (appointments, agreements) post a message into a
//! conversation through [`NotificationPublisher`] without a live client
//! connection of their own.

use parlor_protocol::OutboundFrame;
use std::sync::Arc;
use tracing::debug;

use crate::error::ChatError;
use crate::message::{Attachment, Message, UserId};
use crate::presence::PresenceRegistry;
use crate::store::MessageStore;

/// Injects system-authored messages into conversations.
#[derive(Clone)]
pub struct NotificationPublisher {
    hub: Arc<PresenceRegistry>,
    store: Arc<dyn MessageStore>,
}

impl NotificationPublisher {
    #[must_use]
    pub fn new(hub: Arc<PresenceRegistry>, store: Arc<dyn MessageStore>) -> Self {
        Self { hub, store }
    }

    /// Store a notification from `sender` to `receiver` and push it to
    /// whichever of the two is online, each from their own perspective.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::MissingAttachment`] without a business
    /// reference, [`ChatError::SelfConversation`] if both users are the
    /// same, or a persistence error if the store fails. Nothing is
    /// delivered on error.
    pub async fn publish(
        &self,
        attachment: Attachment,
        content: impl Into<String>,
        sender: UserId,
        receiver: UserId,
    ) -> Result<Message, ChatError> {
        if attachment.is_none() {
            return Err(ChatError::MissingAttachment);
        }

        let mut message = Message::new(sender, receiver, content)?.with_attachment(attachment);
        if self.hub.is_peer_actively_viewing(sender, receiver) {
            let sent_at = message.sent_at;
            message.mark_read(sent_at);
        }

        self.store
            .save_message(&message)
            .await
            .map_err(|e| ChatError::persistence("error while sending notification", e))?;

        for user in [sender, receiver] {
            match self.hub.lookup(user) {
                Some(connection) => {
                    connection
                        .deliver(OutboundFrame::message(message.payload_for(user), None))
                        .await;
                }
                None => debug!(user = %user, message = %message.id, "Notification stored for offline user"),
            }
        }

        Ok(message)
    }
}
