//! Little-endian payload encoding and decoding.
//!
//! Every consensus structure has one canonical byte layout, written here
//! field by field. Decoding is strict: short buffers, bad curve points and
//! trailing bytes are all errors.

use sba_types::{
    Agreement, BidError, Block, BlockHeader, BlsPublicKey, BlsSignature, Certificate,
    CommitteeBitset, ConsensusHeader, CryptoError, EdKeyPair, EdPublicKey, EdSignature, Hash,
    Reduction, ScoreEvent, Seed, StepVotes, Transaction, TransactionPayload,
    BLS_PUBLIC_KEY_SIZE, BLS_SIGNATURE_SIZE, ED25519_PUBLIC_KEY_SIZE, ED25519_SIGNATURE_SIZE,
    SEED_SIZE,
};
use thiserror::Error;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Unexpected end of payload")]
    UnexpectedEnd,
    #[error("Trailing bytes after payload")]
    TrailingBytes,
    #[error("Unknown topic byte: {0:#04x}")]
    UnknownTopic(u8),
    #[error("Unknown tag: {0:#04x}")]
    UnknownTag(u8),
    #[error("Length field {got} exceeds limit {limit}")]
    LengthExceeded { got: usize, limit: usize },
    #[error("Invalid envelope signature")]
    InvalidEnvelope,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Bid(#[from] BidError),
}

/// Variable-length fields are length-prefixed; cap them well above any
/// legitimate payload to bound allocation on malformed input.
const MAX_VAR_LEN: usize = 16 * 1024 * 1024;

/// A cursor over a payload buffer.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn finish(&self) -> Result<(), CodecError> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes)
        }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEnd);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        Ok(self.take(N)?.try_into().unwrap())
    }

    pub fn var_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.u32()? as usize;
        if len > MAX_VAR_LEN {
            return Err(CodecError::LengthExceeded {
                got: len,
                limit: MAX_VAR_LEN,
            });
        }
        Ok(self.take(len)?.to_vec())
    }

    pub fn hash(&mut self) -> Result<Hash, CodecError> {
        Ok(Hash::from_bytes(self.array::<32>()?))
    }

    pub fn bls_public_key(&mut self) -> Result<BlsPublicKey, CodecError> {
        Ok(BlsPublicKey::from_bytes(self.take(BLS_PUBLIC_KEY_SIZE)?)?)
    }

    pub fn bls_signature(&mut self) -> Result<BlsSignature, CodecError> {
        Ok(BlsSignature::from_bytes(self.take(BLS_SIGNATURE_SIZE)?)?)
    }

    pub fn seed(&mut self) -> Result<Seed, CodecError> {
        Ok(Seed::from_bytes(self.array::<SEED_SIZE>()?))
    }
}

fn put_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

// ═══════════════════════════════════════════════════════════════════════════
// Consensus header
// ═══════════════════════════════════════════════════════════════════════════

fn write_consensus_header(out: &mut Vec<u8>, h: &ConsensusHeader) {
    out.extend_from_slice(&h.pub_key_bls.to_bytes());
    out.extend_from_slice(&h.round.to_le_bytes());
    out.push(h.step);
    out.extend_from_slice(h.block_hash.as_bytes());
}

fn read_consensus_header(r: &mut Reader<'_>) -> Result<ConsensusHeader, CodecError> {
    Ok(ConsensusHeader {
        pub_key_bls: r.bls_public_key()?,
        round: r.u64()?,
        step: r.u8()?,
        block_hash: r.hash()?,
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// StepVotes / Certificate
// ═══════════════════════════════════════════════════════════════════════════

fn write_step_votes(out: &mut Vec<u8>, sv: &StepVotes) {
    out.extend_from_slice(&sv.aggregate.to_bytes());
    out.extend_from_slice(&sv.bitset.bits().to_le_bytes());
    out.push(sv.step);
}

fn read_step_votes(r: &mut Reader<'_>) -> Result<StepVotes, CodecError> {
    Ok(StepVotes {
        aggregate: r.bls_signature()?,
        bitset: CommitteeBitset::from_bits(r.u64()?),
        step: r.u8()?,
    })
}

fn write_certificate(out: &mut Vec<u8>, cert: &Certificate) {
    out.extend_from_slice(&cert.step_one_seal.to_bytes());
    out.extend_from_slice(&cert.step_two_seal.to_bytes());
    out.extend_from_slice(&cert.step_one_bitset.bits().to_le_bytes());
    out.extend_from_slice(&cert.step_two_bitset.bits().to_le_bytes());
    out.push(cert.step);
}

fn read_certificate(r: &mut Reader<'_>) -> Result<Certificate, CodecError> {
    Ok(Certificate {
        step_one_seal: r.bls_signature()?,
        step_two_seal: r.bls_signature()?,
        step_one_bitset: CommitteeBitset::from_bits(r.u64()?),
        step_two_bitset: CommitteeBitset::from_bits(r.u64()?),
        step: r.u8()?,
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Transactions / blocks
// ═══════════════════════════════════════════════════════════════════════════

fn read_transaction(r: &mut Reader<'_>) -> Result<Transaction, CodecError> {
    let tag = r.u8()?;
    let payload = match tag {
        0 => TransactionPayload::Transfer {
            raw: r.var_bytes()?,
        },
        1 => TransactionPayload::Stake {
            amount: r.u64()?,
            lock: r.u64()?,
            public_key_bls: r.bls_public_key()?,
            public_key_ed: EdPublicKey::from_bytes(r.take(ED25519_PUBLIC_KEY_SIZE)?)?,
        },
        2 => TransactionPayload::Bid {
            d: r.array::<32>()?,
            m: r.array::<32>()?,
            lock: r.u64()?,
        },
        3 => TransactionPayload::Coinbase {
            reward: r.u64()?,
            generator: r.bls_public_key()?,
        },
        other => return Err(CodecError::UnknownTag(other)),
    };
    Ok(Transaction { payload })
}

fn write_block_header(out: &mut Vec<u8>, h: &BlockHeader) {
    out.push(h.version);
    out.extend_from_slice(&h.height.to_le_bytes());
    out.extend_from_slice(&h.timestamp.to_le_bytes());
    out.extend_from_slice(h.prev_hash.as_bytes());
    out.extend_from_slice(h.seed.as_bytes());
    out.extend_from_slice(&h.generator.to_bytes());
    out.extend_from_slice(h.tx_root.as_bytes());
    out.extend_from_slice(h.state_hash.as_bytes());
    out.extend_from_slice(h.hash.as_bytes());
    write_certificate(out, &h.certificate);
}

fn read_block_header(r: &mut Reader<'_>) -> Result<BlockHeader, CodecError> {
    Ok(BlockHeader {
        version: r.u8()?,
        height: r.u64()?,
        timestamp: r.i64()?,
        prev_hash: r.hash()?,
        seed: r.seed()?,
        generator: r.bls_public_key()?,
        tx_root: r.hash()?,
        state_hash: r.hash()?,
        hash: r.hash()?,
        certificate: read_certificate(r)?,
    })
}

/// Encode a full block.
pub fn encode_block(block: &Block) -> Vec<u8> {
    let mut out = Vec::with_capacity(512);
    write_block_header(&mut out, &block.header);
    out.extend_from_slice(&(block.txs.len() as u32).to_le_bytes());
    for tx in &block.txs {
        tx.write_canonical(&mut out);
    }
    out
}

/// Decode a full block. The header hash is taken as-is; callers re-verify
/// it against the content before trusting the block.
pub fn decode_block(r: &mut Reader<'_>) -> Result<Block, CodecError> {
    let header = read_block_header(r)?;
    let count = r.u32()? as usize;
    if count > MAX_VAR_LEN {
        return Err(CodecError::LengthExceeded {
            got: count,
            limit: MAX_VAR_LEN,
        });
    }
    let mut txs = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        txs.push(read_transaction(r)?);
    }
    Ok(Block { header, txs })
}

// ═══════════════════════════════════════════════════════════════════════════
// Consensus payloads
// ═══════════════════════════════════════════════════════════════════════════

fn encode_reduction(reduction: &Reduction) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    write_consensus_header(&mut out, &reduction.header);
    out.extend_from_slice(&reduction.signed_hash.to_bytes());
    out
}

fn decode_reduction(r: &mut Reader<'_>) -> Result<Reduction, CodecError> {
    Ok(Reduction {
        header: read_consensus_header(r)?,
        signed_hash: r.bls_signature()?,
    })
}

fn encode_agreement(agreement: &Agreement) -> Vec<u8> {
    let mut out = Vec::with_capacity(384);
    write_consensus_header(&mut out, &agreement.header);
    for sv in &agreement.votes_per_step {
        write_step_votes(&mut out, sv);
    }
    out
}

fn decode_agreement(r: &mut Reader<'_>) -> Result<Agreement, CodecError> {
    Ok(Agreement {
        header: read_consensus_header(r)?,
        votes_per_step: [read_step_votes(r)?, read_step_votes(r)?],
    })
}

fn encode_score(score: &ScoreEvent) -> Vec<u8> {
    let mut out = Vec::with_capacity(512);
    write_consensus_header(&mut out, &score.header);
    out.extend_from_slice(&score.score);
    put_var_bytes(&mut out, &score.proof);
    out.extend_from_slice(&score.z);
    put_var_bytes(&mut out, &score.bid_list_subset);
    out.extend_from_slice(score.seed.as_bytes());
    out.extend_from_slice(score.prev_hash.as_bytes());
    out
}

fn decode_score(r: &mut Reader<'_>) -> Result<ScoreEvent, CodecError> {
    Ok(ScoreEvent {
        header: read_consensus_header(r)?,
        score: r.array::<32>()?,
        proof: r.var_bytes()?,
        z: r.array::<32>()?,
        bid_list_subset: r.var_bytes()?,
        seed: r.seed()?,
        prev_hash: r.hash()?,
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Envelope and payload dispatch
// ═══════════════════════════════════════════════════════════════════════════

use crate::sync::{GetBlocks, GetData, GetHeaders, Inv, RoundResults};
use crate::topics::Topic;
use crate::{VerAck, Version};

/// A decoded wire payload.
#[derive(Debug, Clone)]
pub enum Payload {
    Version(Version),
    VerAck(VerAck),
    Inv(Inv),
    GetData(GetData),
    GetBlocks(GetBlocks),
    GetHeaders(GetHeaders),
    Block(Block),
    Candidate(Block),
    Score(ScoreEvent),
    Reduction(Reduction),
    Agreement(Agreement),
    GetRoundResults { round: u64 },
    RoundResults(RoundResults),
}

impl Payload {
    pub fn topic(&self) -> Topic {
        match self {
            Payload::Version(_) => Topic::Version,
            Payload::VerAck(_) => Topic::VerAck,
            Payload::Inv(_) => Topic::Inv,
            Payload::GetData(_) => Topic::GetData,
            Payload::GetBlocks(_) => Topic::GetBlocks,
            Payload::GetHeaders(_) => Topic::GetHeaders,
            Payload::Block(_) => Topic::Block,
            Payload::Candidate(_) => Topic::Candidate,
            Payload::Score(_) => Topic::Score,
            Payload::Reduction(_) => Topic::Reduction,
            Payload::Agreement(_) => Topic::Agreement,
            Payload::GetRoundResults { .. } => Topic::GetRoundResults,
            Payload::RoundResults(_) => Topic::RoundResults,
        }
    }
}

/// Encode a payload, wrapping signed topics in an Ed25519 envelope.
pub fn encode_payload(payload: &Payload, keys: &EdKeyPair) -> Vec<u8> {
    let body = encode_body(payload);
    if payload.topic().is_signed() {
        let signature = keys.sign(&body);
        let mut out =
            Vec::with_capacity(ED25519_SIGNATURE_SIZE + ED25519_PUBLIC_KEY_SIZE + body.len());
        out.extend_from_slice(&signature.to_bytes());
        out.extend_from_slice(&keys.public_key().to_bytes());
        out.extend_from_slice(&body);
        out
    } else {
        body
    }
}

fn encode_body(payload: &Payload) -> Vec<u8> {
    match payload {
        Payload::Version(v) => v.encode(),
        Payload::VerAck(_) => Vec::new(),
        Payload::Inv(inv) => inv.encode(),
        Payload::GetData(m) => m.encode(),
        Payload::GetBlocks(m) => m.encode(),
        Payload::GetHeaders(m) => m.encode(),
        Payload::Block(block) | Payload::Candidate(block) => encode_block(block),
        Payload::Score(score) => encode_score(score),
        Payload::Reduction(reduction) => encode_reduction(reduction),
        Payload::Agreement(agreement) => encode_agreement(agreement),
        Payload::GetRoundResults { round } => round.to_le_bytes().to_vec(),
        Payload::RoundResults(m) => m.encode(),
    }
}

/// Decode a payload for a topic, verifying the envelope of signed topics.
///
/// An invalid envelope signature is `CodecError::InvalidEnvelope`; the
/// message is dropped at the transport layer and never reaches consensus.
pub fn decode_payload(topic: Topic, bytes: &[u8]) -> Result<Payload, CodecError> {
    let body = if topic.is_signed() {
        let mut r = Reader::new(bytes);
        let signature = EdSignature::from_bytes(r.take(ED25519_SIGNATURE_SIZE)?)?;
        let sender = EdPublicKey::from_bytes(r.take(ED25519_PUBLIC_KEY_SIZE)?)?;
        let body = r.take(r.remaining())?;
        sender
            .verify(body, &signature)
            .map_err(|_| CodecError::InvalidEnvelope)?;
        body
    } else {
        bytes
    };

    let mut r = Reader::new(body);
    let payload = match topic {
        Topic::Version => Payload::Version(Version::decode(&mut r)?),
        Topic::VerAck => Payload::VerAck(VerAck),
        Topic::Inv => Payload::Inv(Inv::decode(&mut r)?),
        Topic::GetData => Payload::GetData(GetData::decode(&mut r)?),
        Topic::GetBlocks => Payload::GetBlocks(GetBlocks::decode(&mut r)?),
        Topic::GetHeaders => Payload::GetHeaders(GetHeaders::decode(&mut r)?),
        Topic::Block => Payload::Block(decode_block(&mut r)?),
        Topic::Candidate => Payload::Candidate(decode_block(&mut r)?),
        Topic::Score => Payload::Score(decode_score(&mut r)?),
        Topic::Reduction => Payload::Reduction(decode_reduction(&mut r)?),
        Topic::Agreement => Payload::Agreement(decode_agreement(&mut r)?),
        Topic::GetRoundResults => Payload::GetRoundResults { round: r.u64()? },
        Topic::RoundResults => Payload::RoundResults(RoundResults::decode(&mut r)?),
    };
    r.finish()?;
    Ok(payload)
}
