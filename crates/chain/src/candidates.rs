//! Candidate block store.
//!
//! Candidates live here from reception until a block of greater height is
//! accepted, at which point they are obsolete and evicted.

use sba_types::{Block, Hash};
use std::collections::HashMap;

#[derive(Default)]
pub struct CandidateStore {
    blocks: HashMap<Hash, Block>,
}

impl CandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, block: Block) {
        self.blocks.insert(block.hash(), block);
    }

    pub fn get(&self, hash: &Hash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Drop candidates at or below `height`. Returns how many were evicted.
    pub fn evict_below(&mut self, height: u64) -> usize {
        let before = self.blocks.len();
        self.blocks.retain(|_, b| b.height() > height);
        before - self.blocks.len()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis;

    #[test]
    fn eviction_by_height() {
        let mut store = CandidateStore::new();
        let genesis = genesis::block();
        let intermediate = genesis::mock_intermediate(&genesis);
        store.insert(genesis.clone());
        store.insert(intermediate.clone());

        let evicted = store.evict_below(0);
        assert_eq!(evicted, 1);
        assert!(!store.contains(&genesis.hash()));
        assert!(store.contains(&intermediate.hash()));
    }
}
