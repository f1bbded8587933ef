//! The block store contract.
//!
//! Persistence is an external collaborator: the production runner provides
//! a RocksDB-backed implementation, the simulation an in-memory one. The
//! acceptor only relies on `store_block` being atomic across the block,
//! the height index and the tip pointer.

use crate::StorageError;
use sba_types::{Block, Hash};
use std::collections::HashMap;
use std::sync::Mutex;

/// Persisted chain state: blocks by hash, hash by height, a tip pointer.
pub trait BlockStore: Send + Sync {
    /// Persist a block and advance the tip to it, atomically.
    fn store_block(&self, block: &Block) -> Result<(), StorageError>;

    fn block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, StorageError>;

    fn block_by_height(&self, height: u64) -> Result<Option<Block>, StorageError>;

    /// The current tip hash, if any block was stored.
    fn tip(&self) -> Result<Option<Hash>, StorageError>;

    /// Wipe everything. Only used by the operator rebuild path.
    fn clear(&self) -> Result<(), StorageError>;
}

#[derive(Default)]
struct MemoryInner {
    by_hash: HashMap<Hash, Block>,
    by_height: HashMap<u64, Hash>,
    tip: Option<Hash>,
}

/// In-memory store used by tests and the simulation runner.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_count(&self) -> usize {
        self.inner.lock().unwrap().by_hash.len()
    }
}

impl BlockStore for MemoryStore {
    fn store_block(&self, block: &Block) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.by_hash.insert(block.hash(), block.clone());
        inner.by_height.insert(block.height(), block.hash());
        inner.tip = Some(block.hash());
        Ok(())
    }

    fn block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        Ok(self.inner.lock().unwrap().by_hash.get(hash).cloned())
    }

    fn block_by_height(&self, height: u64) -> Result<Option<Block>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .by_height
            .get(&height)
            .and_then(|hash| inner.by_hash.get(hash))
            .cloned())
    }

    fn tip(&self) -> Result<Option<Hash>, StorageError> {
        Ok(self.inner.lock().unwrap().tip)
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.by_hash.clear();
        inner.by_height.clear();
        inner.tip = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis;

    #[test]
    fn store_and_fetch() {
        let store = MemoryStore::new();
        let block = genesis::block();
        store.store_block(&block).unwrap();

        assert_eq!(store.tip().unwrap(), Some(block.hash()));
        assert_eq!(
            store.block_by_hash(&block.hash()).unwrap().unwrap().hash(),
            block.hash()
        );
        assert_eq!(
            store.block_by_height(0).unwrap().unwrap().hash(),
            block.hash()
        );
    }

    #[test]
    fn clear_resets_everything() {
        let store = MemoryStore::new();
        store.store_block(&genesis::block()).unwrap();
        store.clear().unwrap();
        assert_eq!(store.tip().unwrap(), None);
        assert_eq!(store.block_count(), 0);
    }
}
