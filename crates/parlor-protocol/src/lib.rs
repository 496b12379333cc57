//! # parlor-protocol
//!
//! Wire protocol definitions for the Parlor chat engine.
//!
//! Clients and the server exchange JSON frames over a WebSocket. Each
//! frame carries an `event` discriminant.
//!
//! ## Inbound events
//!
//! - `MSG` - Send a message to the open conversation
//! - `JOIN` / `LEFT` - Open or close a conversation
//!
//! ## Outbound events
//!
//! - `MSG` - A message, framed from the recipient's perspective
//! - `READ` - Read receipt
//! - `CHATS` - Chat list preview bump
//! - `CONN` - Connection established
//! - `ERROR` - Recoverable error
//!
//! ## Example
//!
//! ```rust
//! use parlor_protocol::{codec, InboundEvent};
//!
//! let frame = codec::decode(br#"{"event":"MSG","content":"hello"}"#).unwrap();
//! assert_eq!(frame.event, InboundEvent::Msg);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{
    AttachmentPayload, ChatBump, ErrorBody, FatalError, InboundEvent, InboundFrame,
    MessagePayload, OutboundFrame, ReadReceipt,
};
