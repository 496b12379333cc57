//! Bounded outbound frame queue.
//!
//! Any number of producers enqueue frames for one connection; the write
//! pump is the single consumer. A full queue blocks producers. Once the
//! queue is closed every further enqueue fails with [`QueueError::Closed`].

use parking_lot::Mutex;
use parlor_protocol::OutboundFrame;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default outbound queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Queue errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue was closed.
    #[error("outbound queue closed")]
    Closed,
}

/// Create a queue and its consumer end.
#[must_use]
pub fn channel(capacity: usize) -> (OutboundQueue, OutboundReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        OutboundQueue {
            sender: Mutex::new(Some(tx)),
        },
        OutboundReceiver { rx },
    )
}

/// The producer end of an outbound queue.
#[derive(Debug)]
pub struct OutboundQueue {
    sender: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
}

impl OutboundQueue {
    /// Enqueue a frame, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue is closed or the
    /// consumer is gone.
    pub async fn send(&self, frame: OutboundFrame) -> Result<(), QueueError> {
        let sender = self.sender.lock().clone().ok_or(QueueError::Closed)?;
        sender.send(frame).await.map_err(|_| QueueError::Closed)
    }

    /// Close the queue.
    ///
    /// Frames already enqueued are still delivered. Returns `true` if this
    /// call closed the queue, `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.sender.lock().take().is_some()
    }
}

/// The consumer end of an outbound queue.
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::Receiver<OutboundFrame>,
}

impl OutboundReceiver {
    /// Receive the next frame in FIFO order.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn recv(&mut self) -> Option<OutboundFrame> {
        self.rx.recv().await
    }

    /// Take the next frame if one is ready.
    pub fn try_recv(&mut self) -> Option<OutboundFrame> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting frames; blocked producers fail with
    /// [`QueueError::Closed`].
    pub fn close(&mut self) {
        self.rx.close();
    }
}
