//! RocksDB block store.
//!
//! Column families:
//! - `blocks`: block hash → serialized block
//! - `heights`: big-endian height → block hash
//! - default: tip pointer under a well-known key
//!
//! `store_block` writes all three atomically via a WriteBatch.

use sba_chain::{BlockStore, StorageError};
use sba_messages::{decode_block, encode_block, Reader};
use sba_types::{Block, Hash};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

const CF_BLOCKS: &str = "blocks";
const CF_HEIGHTS: &str = "heights";
const TIP_KEY: &[u8] = b"chain:tip";

/// RocksDB-backed persistence for production use.
pub struct RocksDbStorage {
    db: Arc<DB>,
}

impl RocksDbStorage {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_BLOCKS, Options::default()),
            ColumnFamilyDescriptor::new(CF_HEIGHTS, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, path, cfs)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::Backend(format!("missing column family {name}")))
    }

    fn decode(bytes: &[u8]) -> Result<Block, StorageError> {
        let mut r = Reader::new(bytes);
        decode_block(&mut r).map_err(|e| StorageError::Corrupted(e.to_string()))
    }
}

impl BlockStore for RocksDbStorage {
    fn store_block(&self, block: &Block) -> Result<(), StorageError> {
        let blocks = self.cf(CF_BLOCKS)?;
        let heights = self.cf(CF_HEIGHTS)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(blocks, block.hash().as_bytes(), encode_block(block));
        batch.put_cf(
            heights,
            block.height().to_be_bytes(),
            block.hash().as_bytes(),
        );
        batch.put(TIP_KEY, block.hash().as_bytes());

        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        let blocks = self.cf(CF_BLOCKS)?;
        match self
            .db
            .get_cf(blocks, hash.as_bytes())
            .map_err(|e| StorageError::Backend(e.to_string()))?
        {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn block_by_height(&self, height: u64) -> Result<Option<Block>, StorageError> {
        let heights = self.cf(CF_HEIGHTS)?;
        let Some(hash_bytes) = self
            .db
            .get_cf(heights, height.to_be_bytes())
            .map_err(|e| StorageError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };
        let hash = Hash::from_slice(&hash_bytes)
            .map_err(|e| StorageError::Corrupted(e.to_string()))?;
        self.block_by_hash(&hash)
    }

    fn tip(&self) -> Result<Option<Hash>, StorageError> {
        let Some(bytes) = self
            .db
            .get(TIP_KEY)
            .map_err(|e| StorageError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };
        Ok(Some(
            Hash::from_slice(&bytes).map_err(|e| StorageError::Corrupted(e.to_string()))?,
        ))
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        for name in [CF_BLOCKS, CF_HEIGHTS] {
            let cf = self.cf(name)?;
            for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
                let (key, _) = item.map_err(|e| StorageError::Backend(e.to_string()))?;
                batch.delete_cf(cf, key);
            }
        }
        batch.delete(TIP_KEY);
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sba_chain::genesis;
    use tempfile::TempDir;

    #[test]
    fn store_and_reload() {
        let dir = TempDir::new().unwrap();
        let block = genesis::block();
        {
            let storage = RocksDbStorage::open(dir.path()).unwrap();
            storage.store_block(&block).unwrap();
        }

        // Reopen and verify everything survived.
        let storage = RocksDbStorage::open(dir.path()).unwrap();
        assert_eq!(storage.tip().unwrap(), Some(block.hash()));
        let by_hash = storage.block_by_hash(&block.hash()).unwrap().unwrap();
        assert_eq!(by_hash, block);
        let by_height = storage.block_by_height(0).unwrap().unwrap();
        assert_eq!(by_height.hash(), block.hash());
    }

    #[test]
    fn tip_advances_with_stores() {
        let dir = TempDir::new().unwrap();
        let storage = RocksDbStorage::open(dir.path()).unwrap();
        let genesis_block = genesis::block();
        let intermediate = genesis::mock_intermediate(&genesis_block);

        storage.store_block(&genesis_block).unwrap();
        storage.store_block(&intermediate).unwrap();
        assert_eq!(storage.tip().unwrap(), Some(intermediate.hash()));
    }

    #[test]
    fn clear_wipes_the_database() {
        let dir = TempDir::new().unwrap();
        let storage = RocksDbStorage::open(dir.path()).unwrap();
        let block = genesis::block();
        storage.store_block(&block).unwrap();

        storage.clear().unwrap();
        assert_eq!(storage.tip().unwrap(), None);
        assert!(storage.block_by_hash(&block.hash()).unwrap().is_none());
        assert!(storage.block_by_height(0).unwrap().is_none());
    }

    #[test]
    fn missing_block_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = RocksDbStorage::open(dir.path()).unwrap();
        assert!(storage.block_by_height(42).unwrap().is_none());
    }
}
