//! # parlor-transport
//!
//! Transport abstraction layer for the Parlor chat engine.
//!
//! A connection is handed to the core as two halves:
//!
//! - [`FrameSink`] - written to by the write pump only
//! - [`FrameStream`] - read by the read pump only
//!
//! Implementations:
//!
//! - **WebSocket** - an upgraded axum socket
//! - **Memory** - channel-backed, for driving connections in tests
//!
//! ```rust,ignore
//! use parlor_transport::{FrameStream, websocket};
//!
//! async fn handle(socket: axum::extract::ws::WebSocket) {
//!     let (_sink, mut stream) = websocket::split(socket);
//!     while let Ok(Some(data)) = stream.recv().await {
//!         // Process payload
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{
    CloseReason, ConnectionId, FrameSink, FrameStream, TransportError, CLOSE_NORMAL, CLOSE_POLICY,
};
