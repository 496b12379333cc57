//! Codec for encoding and decoding Parlor frames.
//!
//! Frames travel as one JSON document per WebSocket message, so there is
//! no length prefix: the transport already delimits messages.

use thiserror::Error;

use crate::frames::{ErrorBody, FatalError, InboundFrame, OutboundFrame};

/// Maximum inbound frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Frame is not valid JSON for the expected shape.
    #[error("could not parse json: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encode an outbound frame to a JSON text message.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(frame: &OutboundFrame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode an inbound frame from a raw message payload.
///
/// # Errors
///
/// Returns an error if the payload is too large or is not a valid frame.
pub fn decode(data: &[u8]) -> Result<InboundFrame, ProtocolError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    Ok(serde_json::from_slice(data)?)
}

/// Encode the reason text of a fatal close frame.
///
/// Falls back to the bare error name if serialization fails.
#[must_use]
pub fn encode_fatal(error: ErrorBody) -> String {
    let name = error.name.clone();
    serde_json::to_string(&FatalError { error }).unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::InboundEvent;

    #[test]
    fn test_decode_join() {
        let frame = decode(br#"{"event":"JOIN","content":"3f2b8c1e-0000-4000-8000-000000000001"}"#)
            .unwrap();
        assert_eq!(frame.event, InboundEvent::Join);
        assert_eq!(frame.content, "3f2b8c1e-0000-4000-8000-000000000001");
    }

    #[test]
    fn test_decode_with_tag_and_time() {
        let frame = decode(
            br#"{"event":"MSG","content":"hello","tag":"abc","sent_at":"2024-02-22T03:06:53.313735Z"}"#,
        )
        .unwrap();
        assert_eq!(frame.tag.as_deref(), Some("abc"));
        assert!(frame.sent_at.is_some());
    }

    #[test]
    fn test_decode_malformed() {
        match decode(b"not json") {
            Err(ProtocolError::Malformed(_)) => {}
            other => panic!("Expected Malformed error, got {:?}", other),
        }

        // Missing event tag
        assert!(decode(br#"{"content":"x"}"#).is_err());
    }

    #[test]
    fn test_frame_too_large() {
        let data = vec![b' '; MAX_FRAME_SIZE + 1];
        match decode(&data) {
            Err(ProtocolError::FrameTooLarge(size)) => assert_eq!(size, MAX_FRAME_SIZE + 1),
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_fatal() {
        let reason = encode_fatal(ErrorBody::new(401, "unauthorized", ""));
        assert_eq!(reason, r#"{"error":{"code":401,"name":"unauthorized"}}"#);
    }
}
