//! A live client connection bound to one authenticated user.

use parlor_protocol::OutboundFrame;
use parlor_transport::ConnectionId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::message::UserId;
use crate::queue::{self, OutboundQueue, OutboundReceiver, QueueError};

/// A connection's server-side handle.
///
/// The presence registry and event handlers share it through an `Arc`;
/// its identity (pointer equality) distinguishes two connections of the
/// same user.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    queue: OutboundQueue,
    cancel: CancellationToken,
}

impl Connection {
    /// Create a connection for `user_id` with an outbound queue of the
    /// given capacity. The receiver feeds the write pump.
    #[must_use]
    pub fn new(user_id: UserId, queue_capacity: usize) -> (Arc<Self>, OutboundReceiver) {
        let (queue, outbound) = queue::channel(queue_capacity);
        let connection = Self {
            id: ConnectionId::generate(),
            user_id,
            queue,
            cancel: CancellationToken::new(),
        };
        (Arc::new(connection), outbound)
    }

    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// The authenticated user.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Enqueue a frame for this connection.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] once the connection is closed.
    pub async fn send(&self, frame: OutboundFrame) -> Result<(), QueueError> {
        self.queue.send(frame).await
    }

    /// Enqueue a frame produced on behalf of another user.
    ///
    /// A closed queue means the connection is going away; the frame is
    /// dropped. Returns whether the frame was enqueued.
    pub async fn deliver(&self, frame: OutboundFrame) -> bool {
        match self.queue.send(frame).await {
            Ok(()) => true,
            Err(QueueError::Closed) => {
                debug!(connection = %self.id, user = %self.user_id, "Dropping frame for closed connection");
                false
            }
        }
    }

    /// Close the outbound queue and stop both pumps.
    ///
    /// Returns `true` if this call closed the connection.
    pub fn close(&self) -> bool {
        let closed = self.queue.close();
        self.cancel.cancel();
        if closed {
            debug!(connection = %self.id, user = %self.user_id, "Connection closed");
        }
        closed
    }

    /// Token cancelled when the connection closes.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
