//! One-byte wire topics.

use std::fmt;

/// Message topic, the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Topic {
    Version = 0x00,
    VerAck = 0x01,
    Inv = 0x02,
    GetData = 0x03,
    GetBlocks = 0x04,
    GetHeaders = 0x05,
    Block = 0x06,
    Candidate = 0x07,
    Score = 0x08,
    Reduction = 0x09,
    Agreement = 0x0a,
    GetRoundResults = 0x0b,
    RoundResults = 0x0c,
}

impl Topic {
    pub fn from_byte(byte: u8) -> Option<Topic> {
        match byte {
            0x00 => Some(Topic::Version),
            0x01 => Some(Topic::VerAck),
            0x02 => Some(Topic::Inv),
            0x03 => Some(Topic::GetData),
            0x04 => Some(Topic::GetBlocks),
            0x05 => Some(Topic::GetHeaders),
            0x06 => Some(Topic::Block),
            0x07 => Some(Topic::Candidate),
            0x08 => Some(Topic::Score),
            0x09 => Some(Topic::Reduction),
            0x0a => Some(Topic::Agreement),
            0x0b => Some(Topic::GetRoundResults),
            0x0c => Some(Topic::RoundResults),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether payloads of this topic travel inside an Ed25519 envelope.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Topic::Score | Topic::Candidate | Topic::Reduction | Topic::Agreement
        )
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_roundtrip() {
        for byte in 0x00..=0x0c {
            let topic = Topic::from_byte(byte).unwrap();
            assert_eq!(topic.as_byte(), byte);
        }
        assert!(Topic::from_byte(0xff).is_none());
    }
}
