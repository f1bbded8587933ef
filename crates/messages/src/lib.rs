//! Network messages for the SBA consensus protocol.
//!
//! # Wire Format
//!
//! ```text
//! [topic: u8][length: u32 LE][payload]
//! ```
//!
//! Payloads serialize little-endian. Consensus payloads (score, candidate,
//! reduction, agreement) travel inside an Ed25519 envelope binding the
//! sender to the payload bytes:
//!
//! ```text
//! [signature: 64][public key: 32][payload]
//! ```

mod codec;
mod frame;
mod handshake;
mod sync;
mod topics;

pub use codec::{
    decode_block, decode_payload, encode_block, encode_payload, CodecError, Payload, Reader,
};
pub use frame::{decode_frame, encode_frame, Frame, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
pub use handshake::{VerAck, Version, PROTOCOL_VERSION};
pub use sync::{GetBlocks, GetData, GetHeaders, Inv, InvItem, InvType, RoundResults};
pub use topics::Topic;
