//! Wire framing: a one-byte topic and a four-byte little-endian length.

use crate::{CodecError, Topic};

/// Topic byte plus length field.
pub const FRAME_HEADER_SIZE: usize = 5;

/// Upper bound on a frame payload. Large enough for a full block at the
/// transaction set budget, small enough to bound a malicious length field.
pub const MAX_FRAME_SIZE: usize = 32 * 1024 * 1024;

/// A framed wire message.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub topic: Topic,
    pub payload: Vec<u8>,
}

/// Encode a frame: `[topic][len u32 LE][payload]`.
pub fn encode_frame(topic: Topic, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    out.push(topic.as_byte());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Decode one frame from the front of `buf`. Returns the frame and the
/// number of bytes consumed, or `None` when more bytes are needed.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, CodecError> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }
    let topic = Topic::from_byte(buf[0]).ok_or(CodecError::UnknownTopic(buf[0]))?;
    let len = u32::from_le_bytes(buf[1..5].try_into().unwrap()) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(CodecError::LengthExceeded {
            got: len,
            limit: MAX_FRAME_SIZE,
        });
    }
    if buf.len() < FRAME_HEADER_SIZE + len {
        return Ok(None);
    }
    let payload = buf[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len].to_vec();
    Ok(Some((Frame { topic, payload }, FRAME_HEADER_SIZE + len)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let bytes = encode_frame(Topic::Block, b"payload");
        let (frame, consumed) = decode_frame(&bytes).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(frame.topic, Topic::Block);
        assert_eq!(frame.payload, b"payload");
    }

    #[test]
    fn partial_frame_needs_more() {
        let bytes = encode_frame(Topic::Inv, &[1, 2, 3, 4]);
        assert!(decode_frame(&bytes[..3]).unwrap().is_none());
        assert!(decode_frame(&bytes[..bytes.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn unknown_topic_fails() {
        let mut bytes = encode_frame(Topic::Block, &[]);
        bytes[0] = 0xee;
        assert!(matches!(
            decode_frame(&bytes),
            Err(CodecError::UnknownTopic(0xee))
        ));
    }

    #[test]
    fn oversized_length_fails() {
        let mut bytes = vec![Topic::Block.as_byte()];
        bytes.extend_from_slice(&(u32::MAX).to_le_bytes());
        assert!(matches!(
            decode_frame(&bytes),
            Err(CodecError::LengthExceeded { .. })
        ));
    }

    #[test]
    fn two_frames_in_buffer() {
        let mut bytes = encode_frame(Topic::VerAck, &[]);
        bytes.extend(encode_frame(Topic::Inv, &[9]));
        let (first, used) = decode_frame(&bytes).unwrap().unwrap();
        assert_eq!(first.topic, Topic::VerAck);
        let (second, _) = decode_frame(&bytes[used..]).unwrap().unwrap();
        assert_eq!(second.topic, Topic::Inv);
    }
}
