//! Inbound event handlers: `MSG`, `JOIN` and `LEFT`.

use async_trait::async_trait;
use chrono::Utc;
use parlor_protocol::{InboundEvent, InboundFrame, OutboundFrame};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::connection::Connection;
use crate::error::ChatError;
use crate::message::Message;
use crate::presence::{Delivery, PresenceRegistry};
use crate::queue::QueueError;
use crate::router::{EventHandler, EventRouter};
use crate::store::MessageStore;

/// Shared services every handler works against.
#[derive(Clone)]
pub struct ChatContext {
    pub hub: Arc<PresenceRegistry>,
    pub store: Arc<dyn MessageStore>,
}

impl ChatContext {
    #[must_use]
    pub fn new(hub: Arc<PresenceRegistry>, store: Arc<dyn MessageStore>) -> Self {
        Self { hub, store }
    }
}

/// Build the router for `connection` with every chat handler registered.
#[must_use]
pub fn router(ctx: &ChatContext, connection: Arc<Connection>) -> EventRouter {
    EventRouter::new(connection.clone())
        .on(
            InboundEvent::Msg,
            MsgHandler {
                ctx: ctx.clone(),
                connection: connection.clone(),
            },
        )
        .on(
            InboundEvent::Join,
            JoinHandler {
                ctx: ctx.clone(),
                connection: connection.clone(),
            },
        )
        .on(
            InboundEvent::Left,
            LeftHandler {
                hub: ctx.hub.clone(),
                connection,
            },
        )
}

/// Sends a message into the open conversation.
pub struct MsgHandler {
    ctx: ChatContext,
    connection: Arc<Connection>,
}

#[async_trait]
impl EventHandler for MsgHandler {
    async fn handle(&self, frame: InboundFrame) -> Result<(), ChatError> {
        let sender = self.connection.user_id();
        let peer = self
            .ctx
            .hub
            .active_peer(&self.connection)
            .ok_or(ChatError::NoActiveConversation)?;

        let now = Utc::now();
        let sent_at = frame.sent_at.map_or(now, |at| at.min(now));
        let mut message = Message::new(sender, peer, frame.content)?.with_sent_at(sent_at);

        let delivery = self.ctx.hub.delivery(sender, peer);
        if delivery.is_viewing() {
            message.mark_read(now);
        }

        self.ctx
            .store
            .save_message(&message)
            .await
            .map_err(|e| ChatError::persistence("error while sending message", e))?;

        // The receiver is served even when the sender's own queue is gone
        let echoed = self
            .connection
            .send(OutboundFrame::message(message.payload_for(sender), frame.tag))
            .await;

        match delivery {
            Delivery::Viewing(receiver) => {
                receiver
                    .deliver(OutboundFrame::message(message.payload_for(peer), None))
                    .await;
            }
            Delivery::Online(receiver) => match self.ctx.store.count_unread(sender, peer).await {
                Ok(unread) => {
                    receiver
                        .deliver(OutboundFrame::chats(sender, unread, Some(message.content)))
                        .await;
                }
                Err(e) => warn!(user = %peer, error = %e, "Could not count unread messages"),
            },
            Delivery::Offline => debug!(user = %peer, "Receiver offline, message stored"),
        }

        echoed?;
        Ok(())
    }
}

/// Opens the conversation with the user id in `content`.
pub struct JoinHandler {
    ctx: ChatContext,
    connection: Arc<Connection>,
}

#[async_trait]
impl EventHandler for JoinHandler {
    async fn handle(&self, frame: InboundFrame) -> Result<(), ChatError> {
        let user = self.connection.user_id();
        let peer = Uuid::parse_str(frame.content.trim())
            .map_err(|_| ChatError::InvalidUserId(frame.content.clone()))?;
        if peer == user {
            return Err(ChatError::SelfConversation);
        }

        let previous = self.ctx.hub.active_peer(&self.connection);
        if !self.ctx.hub.set_active_peer(&self.connection, Some(peer)) {
            return Err(QueueError::Closed.into());
        }

        let read_at = Utc::now();
        let updated = match self.ctx.store.mark_read(peer, user, read_at).await {
            Ok(updated) => updated,
            Err(e) => {
                self.ctx.hub.set_active_peer(&self.connection, previous);
                return Err(ChatError::persistence("error while opening chat", e));
            }
        };
        debug!(user = %user, peer = %peer, updated, "Joined conversation");

        if self.ctx.hub.both_actively_viewing(user, peer) {
            let receipt = OutboundFrame::read(peer, user, read_at);
            if let Some(other) = self.ctx.hub.lookup(peer) {
                other.deliver(receipt.clone()).await;
            }
            self.connection.send(receipt).await?;
        }

        self.connection
            .send(OutboundFrame::chats(peer, 0, None))
            .await?;
        Ok(())
    }
}

/// Closes the open conversation.
pub struct LeftHandler {
    hub: Arc<PresenceRegistry>,
    connection: Arc<Connection>,
}

#[async_trait]
impl EventHandler for LeftHandler {
    async fn handle(&self, _frame: InboundFrame) -> Result<(), ChatError> {
        if !self.hub.set_active_peer(&self.connection, None) {
            return Err(QueueError::Closed.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memstore::InMemoryMessageStore;
    use crate::message::{ChatPreview, UserId};
    use crate::queue::OutboundReceiver;
    use crate::store::{Page, StoreError};
    use chrono::{DateTime, Duration};

    struct Client {
        conn: Arc<Connection>,
        outbound: OutboundReceiver,
        router: EventRouter,
    }

    impl Client {
        fn connect(ctx: &ChatContext, user: UserId) -> Self {
            let (conn, outbound) = Connection::new(user, 32);
            ctx.hub.register(conn.clone());
            let router = router(ctx, conn.clone());
            Self {
                conn,
                outbound,
                router,
            }
        }

        async fn send(&self, frame: InboundFrame) {
            let data = serde_json::to_vec(&frame).unwrap();
            self.router.dispatch(&data).await.unwrap();
        }

        fn next(&mut self) -> OutboundFrame {
            self.outbound.try_recv().expect("expected an outbound frame")
        }

        fn assert_idle(&mut self) {
            assert_eq!(self.outbound.try_recv(), None);
        }
    }

    fn setup() -> (ChatContext, Arc<InMemoryMessageStore>) {
        let store = Arc::new(InMemoryMessageStore::new());
        let ctx = ChatContext::new(Arc::new(PresenceRegistry::new()), store.clone());
        (ctx, store)
    }

    fn error_name(frame: OutboundFrame) -> String {
        match frame {
            OutboundFrame::Error(body) => body.name,
            other => panic!("Expected error frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_msg_requires_join() {
        let (ctx, store) = setup();
        let mut alice = Client::connect(&ctx, Uuid::now_v7());

        alice.send(InboundFrame::msg("hello?")).await;
        assert_eq!(error_name(alice.next()), "no-active-conversation");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_msg_delivery_shapes() {
        let (ctx, store) = setup();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let mut alice = Client::connect(&ctx, a);
        let mut bob = Client::connect(&ctx, b);

        alice.send(InboundFrame::join(b)).await;
        assert_eq!(alice.next(), OutboundFrame::chats(b, 0, None));

        // Bob online but elsewhere: stored unread, bump only
        alice.send(InboundFrame::msg("first").with_tag("t1")).await;
        let first_id = match alice.next() {
            OutboundFrame::Message { tag, message } => {
                assert_eq!(tag.as_deref(), Some("t1"));
                assert!(message.author);
                assert_eq!(message.chat_id, b);
                assert!(message.read_at.is_none());
                message.message_id
            }
            other => panic!("Expected echo, got {:?}", other),
        };
        assert_eq!(bob.next(), OutboundFrame::chats(a, 1, Some("first".into())));
        assert!(store.get(first_id).unwrap().read_at.is_none());

        // Bob opens the conversation: stored read, full message pushed
        bob.send(InboundFrame::join(a)).await;
        assert!(matches!(bob.next(), OutboundFrame::Read(_)));
        assert_eq!(bob.next(), OutboundFrame::chats(a, 0, None));
        assert!(matches!(alice.next(), OutboundFrame::Read(_)));

        alice.send(InboundFrame::msg("second")).await;
        let echo = alice.next();
        match bob.next() {
            OutboundFrame::Message { tag, message } => {
                assert!(tag.is_none());
                assert!(!message.author);
                assert_eq!(message.chat_id, a);
                assert_eq!(message.content, "second");
                assert!(message.read_at.is_some());
                assert!(store.get(message.message_id).unwrap().read_at.is_some());
            }
            other => panic!("Expected message, got {:?}", other),
        }
        assert!(matches!(echo, OutboundFrame::Message { .. }));
        alice.assert_idle();
        bob.assert_idle();
    }

    #[tokio::test]
    async fn test_msg_to_offline_user_is_stored() {
        let (ctx, store) = setup();
        let b = Uuid::now_v7();
        let mut alice = Client::connect(&ctx, Uuid::now_v7());

        alice.send(InboundFrame::join(b)).await;
        alice.next();
        alice.send(InboundFrame::msg("are you there")).await;
        assert!(matches!(alice.next(), OutboundFrame::Message { .. }));

        let stored = store
            .list_conversation(alice.conn.user_id(), b, Page::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].read_at.is_none());
    }

    #[tokio::test]
    async fn test_client_sent_at_is_clamped() {
        let (ctx, store) = setup();
        let b = Uuid::now_v7();
        let mut alice = Client::connect(&ctx, Uuid::now_v7());
        alice.send(InboundFrame::join(b)).await;
        alice.next();

        let past = DateTime::parse_from_rfc3339("2024-02-22T03:06:53Z")
            .unwrap()
            .with_timezone(&Utc);
        alice.send(InboundFrame::msg("old").with_sent_at(past)).await;
        alice.send(InboundFrame::msg("future").with_sent_at(Utc::now() + Duration::days(1))).await;

        let stored = store
            .list_conversation(alice.conn.user_id(), b, Page::default())
            .await
            .unwrap();
        assert_eq!(stored[0].sent_at, past);
        assert!(stored[1].sent_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_join_read_receipt_reciprocity() {
        let (ctx, store) = setup();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let mut alice = Client::connect(&ctx, a);
        let mut bob = Client::connect(&ctx, b);

        alice.send(InboundFrame::join(b)).await;
        alice.send(InboundFrame::msg("one")).await;
        alice.send(InboundFrame::msg("two")).await;
        while alice.outbound.try_recv().is_some() {}
        while bob.outbound.try_recv().is_some() {}
        assert_eq!(store.count_unread(a, b).await.unwrap(), 2);

        bob.send(InboundFrame::join(a)).await;
        let read_at = match bob.next() {
            OutboundFrame::Read(receipt) => {
                assert_eq!(receipt.sender_id, a);
                assert_eq!(receipt.receiver_id, b);
                receipt.read_at
            }
            other => panic!("Expected read receipt, got {:?}", other),
        };
        assert_eq!(alice.next(), OutboundFrame::read(a, b, read_at));
        assert_eq!(store.count_unread(a, b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_join_without_peer_viewing_sends_no_receipt() {
        let (ctx, _store) = setup();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let mut alice = Client::connect(&ctx, a);
        let mut bob = Client::connect(&ctx, b);

        bob.send(InboundFrame::join(a)).await;
        assert_eq!(bob.next(), OutboundFrame::chats(a, 0, None));
        bob.assert_idle();
        alice.assert_idle();
    }

    #[tokio::test]
    async fn test_self_join_rejected() {
        let (ctx, _store) = setup();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let mut alice = Client::connect(&ctx, a);

        alice.send(InboundFrame::join(b)).await;
        alice.next();

        alice.send(InboundFrame::join(a)).await;
        assert_eq!(error_name(alice.next()), "self-conversation");
        assert_eq!(ctx.hub.active_peer(&alice.conn), Some(b));

        alice
            .send(InboundFrame {
                content: "not-a-uuid".into(),
                ..InboundFrame::join(b)
            })
            .await;
        assert_eq!(error_name(alice.next()), "invalid-user-id");
        assert_eq!(ctx.hub.active_peer(&alice.conn), Some(b));
    }

    #[tokio::test]
    async fn test_left_clears_active_peer() {
        let (ctx, _store) = setup();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let mut alice = Client::connect(&ctx, a);

        alice.send(InboundFrame::join(b)).await;
        alice.send(InboundFrame::left()).await;
        assert_eq!(ctx.hub.active_peer(&alice.conn), None);

        alice.next();
        alice.send(InboundFrame::msg("hi")).await;
        assert_eq!(error_name(alice.next()), "no-active-conversation");
    }

    struct FailingStore;

    #[async_trait]
    impl MessageStore for FailingStore {
        async fn save_message(&self, _message: &Message) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn mark_read(
            &self,
            _sender: UserId,
            _receiver: UserId,
            _read_at: chrono::DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn list_conversation(
            &self,
            _a: UserId,
            _b: UserId,
            _page: Page,
        ) -> Result<Vec<Message>, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn save_user(&self, _user: UserId, _display_name: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn list_previews(
            &self,
            _user: UserId,
            _filter: &str,
        ) -> Result<Vec<ChatPreview>, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn count_unread(&self, _sender: UserId, _receiver: UserId) -> Result<u64, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_delivers_nothing() {
        let ctx = ChatContext::new(Arc::new(PresenceRegistry::new()), Arc::new(FailingStore));
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let mut alice = Client::connect(&ctx, a);
        let mut bob = Client::connect(&ctx, b);
        ctx.hub.set_active_peer(&bob.conn, Some(a));
        ctx.hub.set_active_peer(&alice.conn, Some(b));

        alice.send(InboundFrame::msg("lost")).await;
        assert_eq!(error_name(alice.next()), "internal-server-error");
        alice.assert_idle();
        bob.assert_idle();
    }

    #[tokio::test]
    async fn test_failed_join_keeps_previous_conversation() {
        let ctx = ChatContext::new(Arc::new(PresenceRegistry::new()), Arc::new(FailingStore));
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let mut alice = Client::connect(&ctx, a);

        alice.send(InboundFrame::join(b)).await;
        match alice.next() {
            OutboundFrame::Error(body) => {
                assert_eq!(body.code, 500);
                assert_eq!(body.message, "error while opening chat");
            }
            other => panic!("Expected error frame, got {:?}", other),
        }
        assert_eq!(ctx.hub.active_peer(&alice.conn), None);
        assert!(!ctx.hub.is_peer_actively_viewing(b, a));

        ctx.hub.set_active_peer(&alice.conn, Some(c));
        alice.send(InboundFrame::join(b)).await;
        assert_eq!(error_name(alice.next()), "internal-server-error");
        assert_eq!(ctx.hub.active_peer(&alice.conn), Some(c));
        alice.assert_idle();
    }

    #[tokio::test]
    async fn test_receiver_served_when_sender_queue_closed() {
        let (ctx, store) = setup();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let alice = Client::connect(&ctx, a);
        let mut bob = Client::connect(&ctx, b);
        ctx.hub.set_active_peer(&alice.conn, Some(b));
        ctx.hub.set_active_peer(&bob.conn, Some(a));

        // Alice's write pump is gone but she is still registered
        let Client {
            conn: alice_conn,
            outbound,
            router: alice_router,
        } = alice;
        drop(outbound);

        let data = serde_json::to_vec(&InboundFrame::msg("still arrives")).unwrap();
        assert_eq!(alice_router.dispatch(&data).await, Err(QueueError::Closed));
        assert!(ctx.hub.is_online(alice_conn.user_id()));

        match bob.next() {
            OutboundFrame::Message { message, .. } => {
                assert_eq!(message.content, "still arrives");
                assert!(!message.author);
                assert!(message.read_at.is_some());
                assert_eq!(store.len(), 1);
            }
            other => panic!("Expected message, got {:?}", other),
        }
        bob.assert_idle();
    }
}
