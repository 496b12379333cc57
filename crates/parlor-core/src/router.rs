//! Per-connection event router.
//!
//! The router maps inbound event tags to handlers and owns the pump pair
//! of its connection:
//!
//! - the **read pump** decodes inbound frames and dispatches them
//! - the **write pump** drains the outbound queue onto the wire
//!
//! Either pump stopping cancels the other.

use async_trait::async_trait;
use parlor_protocol::{codec, InboundEvent, InboundFrame};
use parlor_transport::{ConnectionId, FrameSink, FrameStream};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::connection::Connection;
use crate::error::{ChatError, ErrorKind};
use crate::queue::{OutboundReceiver, QueueError};

/// Handles one inbound event type for one connection.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle a decoded frame.
    ///
    /// Returned errors are reported to the client as error frames, except
    /// [`ChatError::Closed`] which stops the read pump.
    async fn handle(&self, frame: InboundFrame) -> Result<(), ChatError>;
}

/// Dispatches a connection's inbound frames to its handlers.
pub struct EventRouter {
    connection: Arc<Connection>,
    handlers: HashMap<InboundEvent, Arc<dyn EventHandler>>,
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("connection", &self.connection.id())
            .field("events", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventRouter {
    /// Create a router with no handlers.
    #[must_use]
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `event`, replacing any previous one.
    #[must_use]
    pub fn on(mut self, event: InboundEvent, handler: impl EventHandler + 'static) -> Self {
        self.handlers.insert(event, Arc::new(handler));
        self
    }

    /// The connection this router serves.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Decode and dispatch one inbound payload.
    ///
    /// Malformed frames and handler failures are reported to the client
    /// and the connection stays open. Unknown events are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] once the connection can no longer
    /// take outbound frames.
    pub async fn dispatch(&self, data: &[u8]) -> Result<(), QueueError> {
        let frame = match codec::decode(data) {
            Ok(frame) => frame,
            Err(e) => return self.report(ChatError::from(e)).await,
        };

        let Some(handler) = self.handlers.get(&frame.event) else {
            trace!(connection = %self.connection.id(), event = frame.event.as_str(), "Ignoring event");
            return Ok(());
        };

        let event = frame.event;
        match handler.handle(frame).await {
            Ok(()) => Ok(()),
            Err(ChatError::Closed(e)) => Err(e),
            Err(err) => {
                trace!(connection = %self.connection.id(), event = event.as_str(), "Handler failed");
                self.report(err).await
            }
        }
    }

    async fn report(&self, err: ChatError) -> Result<(), QueueError> {
        let user = self.connection.user_id();
        let connection = self.connection.id();
        match err.kind() {
            ErrorKind::Persistence => {
                let source = std::error::Error::source(&err).map(ToString::to_string);
                error!(user = %user, connection = %connection, error = %err, source = ?source, "Store failure");
            }
            _ => debug!(user = %user, connection = %connection, error = %err, "Rejected frame"),
        }
        self.connection.send(err.to_frame()).await
    }

    /// Run the read and write pumps until the connection ends.
    ///
    /// The write pump runs as its own task; the read pump runs on the
    /// caller's. Returns once both have stopped.
    pub async fn listen<S, R>(self, sink: S, mut stream: R, outbound: OutboundReceiver)
    where
        S: FrameSink + 'static,
        R: FrameStream,
    {
        let cancel = self.connection.cancellation();
        let writer = tokio::spawn(write_pump(
            sink,
            outbound,
            cancel.clone(),
            self.connection.id().clone(),
        ));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = stream.recv() => match received {
                    Ok(Some(data)) => {
                        if self.dispatch(&data).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!(connection = %self.connection.id(), "Client closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(connection = %self.connection.id(), error = %e, "Read failed");
                        break;
                    }
                },
            }
        }

        cancel.cancel();
        if let Err(e) = writer.await {
            error!(connection = %self.connection.id(), error = %e, "Write pump panicked");
        }
    }
}

/// Drain the outbound queue onto the wire in FIFO order.
///
/// Frames already queued when the connection closes are still written.
async fn write_pump<S: FrameSink>(
    mut sink: S,
    mut outbound: OutboundReceiver,
    cancel: CancellationToken,
    connection: ConnectionId,
) {
    loop {
        let frame = tokio::select! {
            biased;
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = cancel.cancelled() => break,
        };

        let text = match codec::encode(&frame) {
            Ok(text) => text,
            Err(e) => {
                error!(connection = %connection, event = frame.event(), error = %e, "Encode failed");
                continue;
            }
        };

        if let Err(e) = sink.send_text(text).await {
            debug!(connection = %connection, error = %e, "Write failed");
            break;
        }
    }

    cancel.cancel();
    outbound.close();
    if let Err(e) = sink.close(None).await {
        trace!(connection = %connection, error = %e, "Close after disconnect");
    }
}
