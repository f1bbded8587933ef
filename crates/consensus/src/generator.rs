//! Candidate block assembly.

use sba_types::consts::{GENERATOR_REWARD, MAX_BLOCK_TIME};
use sba_types::{Block, BlockHeader, Certificate, Hash, NodeKeys, RoundUpdate, Seed, Transaction};

const STATE_DST: &[u8] = b"sba-state-hash";

/// Build a candidate block for the round.
///
/// The header extends the intermediate block from the round update; the
/// seed is the generator's signature over the previous seed; transactions
/// come from the mempool and are cut off at `max_tx_set_size` serialized
/// bytes, after the coinbase.
///
/// The timestamp is clamped into `[prev_timestamp, prev_timestamp +
/// MAX_BLOCK_TIME]` so a generator cannot drag consensus time backwards or
/// rush it forward.
pub fn generate_candidate(
    keys: &NodeKeys,
    ru: &RoundUpdate,
    txs: Vec<Transaction>,
    now_secs: i64,
    max_tx_set_size: usize,
) -> Block {
    let generator = keys.bls.public_key();

    let mut timestamp = now_secs;
    if ru.timestamp > 0 {
        let max_timestamp = ru.timestamp + MAX_BLOCK_TIME;
        if timestamp < ru.timestamp {
            timestamp = ru.timestamp;
        } else if timestamp > max_timestamp {
            timestamp = max_timestamp;
        }
    }

    let mut selected = Vec::with_capacity(txs.len() + 1);
    selected.push(Transaction::coinbase(GENERATOR_REWARD, generator));
    let mut budget = max_tx_set_size;
    for tx in txs {
        if tx.is_coinbase() {
            continue;
        }
        let size = tx.serialized_size();
        if size > budget {
            break;
        }
        budget -= size;
        selected.push(tx);
    }

    let seed = Seed::from_signature(&keys.bls.sign(ru.seed.as_bytes()));

    let mut state = Vec::with_capacity(STATE_DST.len() + 32);
    state.extend_from_slice(STATE_DST);
    state.extend_from_slice(ru.prev_hash.as_bytes());

    let header = BlockHeader {
        version: 0,
        height: ru.round,
        timestamp,
        prev_hash: ru.prev_hash,
        seed,
        generator,
        tx_root: Hash::ZERO,
        state_hash: Hash::digest(&state),
        hash: Hash::ZERO,
        certificate: Certificate::empty(),
    };

    Block::new(header, selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sba_types::test_utils::{test_keys, test_provisioners};
    use sba_types::{BidList, TransactionPayload};

    fn round_update(round: u64, timestamp: i64) -> RoundUpdate {
        let (provisioners, _) = test_provisioners(3, 1000, 1000);
        RoundUpdate {
            round,
            prev_hash: Hash::digest(b"prev"),
            seed: Seed::from_bytes([3; 48]),
            timestamp,
            provisioners,
            bid_list: BidList::default(),
            last_certificate_step: 0,
        }
    }

    #[test]
    fn candidate_extends_round_state() {
        let keys = test_keys(1);
        let ru = round_update(5, 100);
        let block = generate_candidate(&keys, &ru, vec![], 150, 825_000);
        assert_eq!(block.height(), 5);
        assert_eq!(block.header.prev_hash, ru.prev_hash);
        assert!(block.header.certificate.is_empty());
        assert_eq!(block.header.hash, block.header.digest());
        // Seed verifies as the generator's signature over the round seed.
        let sig = block.header.seed.as_signature().unwrap();
        assert!(keys
            .bls
            .public_key()
            .verify(ru.seed.as_bytes(), &sig)
            .is_ok());
    }

    #[test]
    fn coinbase_is_first() {
        let keys = test_keys(1);
        let ru = round_update(2, 100);
        let block = generate_candidate(
            &keys,
            &ru,
            vec![Transaction::transfer(vec![1, 2])],
            150,
            825_000,
        );
        assert!(block.txs[0].is_coinbase());
        assert_eq!(block.txs.len(), 2);
    }

    #[test]
    fn timestamp_clamped_below() {
        let keys = test_keys(1);
        let ru = round_update(2, 1_000);
        let block = generate_candidate(&keys, &ru, vec![], 500, 825_000);
        assert_eq!(block.header.timestamp, 1_000);
    }

    #[test]
    fn timestamp_clamped_above() {
        let keys = test_keys(1);
        let ru = round_update(2, 1_000);
        let block = generate_candidate(&keys, &ru, vec![], 10_000, 825_000);
        assert_eq!(block.header.timestamp, 1_000 + MAX_BLOCK_TIME);
    }

    #[test]
    fn tx_budget_is_enforced() {
        let keys = test_keys(1);
        let ru = round_update(2, 100);
        let txs: Vec<_> = (0u8..10)
            .map(|i| Transaction::transfer(vec![i; 100]))
            .collect();
        let block = generate_candidate(&keys, &ru, txs, 150, 250);
        // Coinbase plus however many 100-byte-ish transfers fit in 250 bytes.
        let transfers = block
            .txs
            .iter()
            .filter(|tx| matches!(tx.payload, TransactionPayload::Transfer { .. }))
            .count();
        assert!(transfers < 10);
        assert!(transfers >= 1);
    }
}
