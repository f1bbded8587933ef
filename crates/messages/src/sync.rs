//! Sync control messages.

use crate::{decode_block, encode_block, CodecError, Reader};
use sba_types::consts::MAX_INV_BLOCKS;
use sba_types::{Block, Hash};

/// Inventory item kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InvType {
    Block = 0,
    Tx = 1,
}

impl InvType {
    fn from_byte(byte: u8) -> Result<Self, CodecError> {
        match byte {
            0 => Ok(InvType::Block),
            1 => Ok(InvType::Tx),
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

/// One inventory entry: a type tag and a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvItem {
    pub kind: InvType,
    pub hash: Hash,
}

fn encode_items(items: &[InvItem]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + items.len() * 33);
    out.extend_from_slice(&(items.len() as u32).to_le_bytes());
    for item in items {
        out.push(item.kind as u8);
        out.extend_from_slice(item.hash.as_bytes());
    }
    out
}

fn decode_items(r: &mut Reader<'_>) -> Result<Vec<InvItem>, CodecError> {
    let count = r.u32()? as usize;
    if count > MAX_INV_BLOCKS {
        return Err(CodecError::LengthExceeded {
            got: count,
            limit: MAX_INV_BLOCKS,
        });
    }
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(InvItem {
            kind: InvType::from_byte(r.u8()?)?,
            hash: r.hash()?,
        });
    }
    Ok(items)
}

/// Inventory announcement.
#[derive(Debug, Clone, PartialEq)]
pub struct Inv {
    pub items: Vec<InvItem>,
}

impl Inv {
    pub fn block(hash: Hash) -> Self {
        Self {
            items: vec![InvItem {
                kind: InvType::Block,
                hash,
            }],
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_items(&self.items)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            items: decode_items(r)?,
        })
    }
}

/// Request for the items of a previous `Inv`.
#[derive(Debug, Clone, PartialEq)]
pub struct GetData {
    pub items: Vec<InvItem>,
}

impl GetData {
    pub fn encode(&self) -> Vec<u8> {
        encode_items(&self.items)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            items: decode_items(r)?,
        })
    }
}

/// Request blocks above a height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetBlocks {
    pub from_height: u64,
}

impl GetBlocks {
    pub fn encode(&self) -> Vec<u8> {
        self.from_height.to_le_bytes().to_vec()
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            from_height: r.u64()?,
        })
    }
}

/// Request headers above a height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetHeaders {
    pub from_height: u64,
}

impl GetHeaders {
    pub fn encode(&self) -> Vec<u8> {
        self.from_height.to_le_bytes().to_vec()
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            from_height: r.u64()?,
        })
    }
}

/// Response to `GetRoundResults`: the round's decided block with its
/// certificate attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundResults {
    pub round: u64,
    pub block: Block,
}

impl RoundResults {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(512);
        out.extend_from_slice(&self.round.to_le_bytes());
        out.extend_from_slice(&encode_block(&self.block));
        out
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            round: r.u64()?,
            block: decode_block(r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inv_roundtrip() {
        let inv = Inv::block(Hash::digest(b"block"));
        let bytes = inv.encode();
        let mut r = Reader::new(&bytes);
        assert_eq!(Inv::decode(&mut r).unwrap(), inv);
        r.finish().unwrap();
    }

    #[test]
    fn inv_over_limit_is_rejected() {
        let items = vec![
            InvItem {
                kind: InvType::Block,
                hash: Hash::ZERO,
            };
            MAX_INV_BLOCKS + 1
        ];
        let bytes = encode_items(&items);
        let mut r = Reader::new(&bytes);
        assert!(matches!(
            decode_items(&mut r),
            Err(CodecError::LengthExceeded { .. })
        ));
    }

    #[test]
    fn get_blocks_roundtrip() {
        let m = GetBlocks { from_height: 77 };
        let bytes = m.encode();
        let mut r = Reader::new(&bytes);
        assert_eq!(GetBlocks::decode(&mut r).unwrap(), m);
    }
}
