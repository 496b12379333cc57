//! In-memory transport.
//!
//! A channel-backed connection used to drive the server side of a
//! connection without sockets. The [`MemoryClient`] plays the remote peer.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::traits::{CloseReason, FrameSink, FrameStream, TransportError};

/// Something the server wrote to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// A text frame.
    Text(String),
    /// A close frame.
    Close(Option<CloseReason>),
}

/// Create a connected sink/stream pair together with the client end.
#[must_use]
pub fn pair() -> (MemorySink, MemoryStream, MemoryClient) {
    let (to_client, from_server) = mpsc::unbounded_channel();
    let (to_server, from_client) = mpsc::unbounded_channel();

    (
        MemorySink {
            tx: to_client,
            closed: false,
        },
        MemoryStream { rx: from_client },
        MemoryClient {
            tx: Some(to_server),
            rx: from_server,
        },
    )
}

/// Server-side sending half.
pub struct MemorySink {
    tx: mpsc::UnboundedSender<WireEvent>,
    closed: bool,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.tx
            .send(WireEvent::Text(text))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.tx
            .send(WireEvent::Close(reason))
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

/// Server-side receiving half.
pub struct MemoryStream {
    rx: mpsc::UnboundedReceiver<Result<Bytes, TransportError>>,
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(data)) => Ok(Some(data)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// The remote end of an in-memory connection.
pub struct MemoryClient {
    tx: Option<mpsc::UnboundedSender<Result<Bytes, TransportError>>>,
    rx: mpsc::UnboundedReceiver<WireEvent>,
}

impl MemoryClient {
    /// Send a text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has disconnected or the server
    /// dropped its receiving half.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(Ok(Bytes::from(text.into())))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Make the server's next read fail with a transport error.
    pub fn fail(&self, reason: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Err(TransportError::ReceiveFailed(reason.into())));
        }
    }

    /// Close the client side cleanly.
    pub fn disconnect(&mut self) {
        self.tx = None;
    }

    /// Receive the next thing the server wrote.
    ///
    /// Returns `None` once the server dropped its sending half.
    pub async fn recv(&mut self) -> Option<WireEvent> {
        self.rx.recv().await
    }

    /// Receive the next text frame, or `None` on close.
    pub async fn recv_text(&mut self) -> Option<String> {
        match self.rx.recv().await {
            Some(WireEvent::Text(text)) => Some(text),
            _ => None,
        }
    }
}
