//! Connection lifecycle: authenticate, register, pump, unregister.

use parlor_protocol::{codec, OutboundFrame};
use parlor_transport::{CloseReason, FrameSink, FrameStream};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, Identity, SessionValidator};
use crate::connection::Connection;
use crate::error::ChatError;
use crate::handlers::{self, ChatContext};
use crate::message::UserId;
use crate::queue::DEFAULT_QUEUE_CAPACITY;

/// Serves accepted transport connections.
#[derive(Clone)]
pub struct ChatSession {
    ctx: ChatContext,
    sessions: Arc<dyn SessionValidator>,
    queue_capacity: usize,
}

impl ChatSession {
    #[must_use]
    pub fn new(ctx: ChatContext, sessions: Arc<dyn SessionValidator>) -> Self {
        Self {
            ctx,
            sessions,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Set the per-connection outbound queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn context(&self) -> &ChatContext {
        &self.ctx
    }

    /// Drive one connection from handshake to teardown.
    ///
    /// On a failed session check the client receives a policy close frame
    /// whose reason is the encoded error, and nothing is registered.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Unauthorized`] if the token is rejected.
    pub async fn serve<S, R>(
        &self,
        token: Option<&str>,
        mut sink: S,
        stream: R,
    ) -> Result<UserId, ChatError>
    where
        S: FrameSink + 'static,
        R: FrameStream,
    {
        let identity = match self.authenticate(token).await {
            Ok(identity) => identity,
            Err(e) => {
                let err = ChatError::from(e);
                warn!(error = %err, "Rejected connection");
                let reason = CloseReason::policy(codec::encode_fatal(err.to_body()));
                if let Err(e) = sink.close(Some(reason)).await {
                    debug!(error = %e, "Failed to send close frame");
                }
                return Err(err);
            }
        };
        let user = identity.user_id;
        if let Some(name) = &identity.display_name {
            if let Err(e) = self.ctx.store.save_user(user, name).await {
                warn!(user = %user, error = %e, "Could not record display name");
            }
        }

        let (connection, outbound) = Connection::new(user, self.queue_capacity);
        if let Some(evicted) = self.ctx.hub.register(connection.clone()) {
            debug!(user = %user, evicted = %evicted.id(), "Evicted previous connection");
        }
        info!(user = %user, connection = %connection.id(), "Connected");

        if connection.send(OutboundFrame::Connected).await.is_ok() {
            handlers::router(&self.ctx, connection.clone())
                .listen(sink, stream, outbound)
                .await;
        }

        self.ctx.hub.unregister(&connection);
        info!(user = %user, connection = %connection.id(), "Disconnected");
        Ok(user)
    }

    async fn authenticate(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        match token {
            Some(token) if !token.is_empty() => self.sessions.validate(token).await,
            _ => Err(AuthError::MissingToken),
        }
    }
}
