//! WebSocket transport implementation.
//!
//! Adapts an upgraded axum [`WebSocket`] to the [`FrameSink`] and
//! [`FrameStream`] halves used by the connection pumps.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::traits::{CloseReason, FrameSink, FrameStream, TransportError};

/// Split an upgraded WebSocket into its sending and receiving halves.
#[must_use]
pub fn split(socket: WebSocket) -> (WebSocketSink, WebSocketStream) {
    let (sender, receiver) = socket.split();
    (
        WebSocketSink {
            inner: sender,
            closed: false,
        },
        WebSocketStream { inner: receiver },
    )
}

/// The sending half of a WebSocket connection.
pub struct WebSocketSink {
    inner: SplitSink<WebSocket, Message>,
    closed: bool,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), TransportError> {
        if self.closed {
            return Ok(()); // Already closed
        }
        self.closed = true;

        let frame = reason.map(|r| CloseFrame {
            code: r.code,
            reason: r.reason.into(),
        });

        if let Err(e) = self.inner.send(Message::Close(frame)).await {
            debug!(error = %e, "Failed to send close frame");
        }

        self.inner
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(format!("Failed to close: {}", e)))
    }
}

/// The receiving half of a WebSocket connection.
pub struct WebSocketStream {
    inner: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameStream for WebSocketStream {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(Bytes::from(text))),
                Some(Ok(Message::Binary(data))) => return Ok(Some(Bytes::from(data))),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Pongs are queued by the WebSocket layer
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(frame = ?frame, "Received close frame");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}
