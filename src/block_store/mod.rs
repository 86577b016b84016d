/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Persistent storage of the chain: the chain height, the consensus certificate for the block at that
//! height, and every header and body keyed by height.
//!
//! ## Locking
//!
//! Each getter and setter touches exactly one state variable and is atomic on its own. Extending the
//! chain touches four (header, body, height, and last consensus), and must be re-checked against the
//! current height before it happens. [`BlockStore`] does not decide when that is needed: callers group
//! such compound operations inside [`with_lock`](BlockStore::with_lock), which serializes them against
//! every other task run through the same lock.
//!
//! ## Height cache
//!
//! The chain height is read far more often than it is written, so the last height seen or written is
//! cached in memory. A store that has never had its height set reports height 0.

pub mod pluggables;

pub mod variables;

use std::fmt::{self, Display, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};

use borsh::BorshSerialize;

use crate::lock::Lock;
use crate::types::{
    block::{BlockBody, BlockHeader},
    consensus::Consensus,
    data_types::BlockHeight,
    serialization::write_u64,
};

use pluggables::{KVGetError, KVStore, Key, WriteBatch};

pub struct BlockStore<K: KVStore> {
    kv_store: Mutex<K>,
    height_cache: Mutex<Option<BlockHeight>>,
    lock: Lock,
}

impl<K: KVStore> BlockStore<K> {
    pub fn new(kv_store: K) -> Self {
        Self {
            kv_store: Mutex::new(kv_store),
            height_cache: Mutex::new(None),
            lock: Lock::new(),
        }
    }

    /// Run `task` while holding the store's lock.
    pub fn with_lock<T>(&self, task: impl FnOnce() -> T) -> T {
        self.lock.use_exclusively(task)
    }

    /* ↓↓↓ Getters ↓↓↓ */

    pub fn height(&self) -> Result<BlockHeight, BlockStoreError> {
        let mut cache = self.height_cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(height) = *cache {
            return Ok(height);
        }
        match self.kv_store().height()? {
            Some(height) => {
                *cache = Some(height);
                Ok(height)
            }
            None => Ok(0),
        }
    }

    pub fn header(&self, height: BlockHeight) -> Result<BlockHeader, BlockStoreError> {
        Ok(self.kv_store().header(height)?)
    }

    pub fn body(&self, height: BlockHeight) -> Result<BlockBody, BlockStoreError> {
        Ok(self.kv_store().body(height)?)
    }

    pub fn last_consensus(&self) -> Result<Consensus, BlockStoreError> {
        Ok(self.kv_store().last_consensus()?)
    }

    /* ↓↓↓ Setters ↓↓↓ */

    pub fn set_height(&self, height: BlockHeight) -> Result<(), BlockStoreError> {
        let mut wb = K::WriteBatch::new();
        put_height(&mut wb, height)?;
        // Hold the cache across the write so that a concurrent reader cannot re-populate it with the
        // value being replaced.
        let mut cache = self.height_cache.lock().unwrap_or_else(PoisonError::into_inner);
        self.kv_store().write(wb);
        *cache = Some(height);
        Ok(())
    }

    pub fn set_header(&self, height: BlockHeight, header: &BlockHeader) -> Result<(), BlockStoreError> {
        let mut wb = K::WriteBatch::new();
        put(&mut wb, Key::Header { height }, &variables::header_key(height), header)?;
        self.kv_store().write(wb);
        Ok(())
    }

    pub fn set_body(&self, height: BlockHeight, body: &BlockBody) -> Result<(), BlockStoreError> {
        let mut wb = K::WriteBatch::new();
        put(&mut wb, Key::Body { height }, &variables::body_key(height), body)?;
        self.kv_store().write(wb);
        Ok(())
    }

    pub fn set_last_consensus(&self, consensus: &Consensus) -> Result<(), BlockStoreError> {
        let mut wb = K::WriteBatch::new();
        put(&mut wb, Key::LastConsensus, &variables::LAST_CONSENSUS, consensus)?;
        self.kv_store().write(wb);
        Ok(())
    }

    /// Write the block at `header.height` together with the chain height and the certificate for that
    /// block, in a single write batch.
    ///
    /// This does not check that `header.height` is the successor of the current height. Callers must
    /// do so inside [`with_lock`](Self::with_lock).
    pub fn extend_chain(
        &self,
        header: &BlockHeader,
        body: &BlockBody,
        consensus: &Consensus,
    ) -> Result<(), BlockStoreError> {
        let height = header.height;
        let mut wb = K::WriteBatch::new();
        put(&mut wb, Key::Header { height }, &variables::header_key(height), header)?;
        put(&mut wb, Key::Body { height }, &variables::body_key(height), body)?;
        put(&mut wb, Key::LastConsensus, &variables::LAST_CONSENSUS, consensus)?;
        put_height(&mut wb, height)?;

        let mut cache = self.height_cache.lock().unwrap_or_else(PoisonError::into_inner);
        self.kv_store().write(wb);
        *cache = Some(height);
        Ok(())
    }

    /// Move the chain height to `height`, whose header and body must already be stored, and record
    /// `consensus` as its certificate. Like [`extend_chain`](Self::extend_chain), callers check the
    /// current height inside [`with_lock`](Self::with_lock).
    pub fn set_tip(&self, height: BlockHeight, consensus: &Consensus) -> Result<(), BlockStoreError> {
        let mut wb = K::WriteBatch::new();
        put(&mut wb, Key::LastConsensus, &variables::LAST_CONSENSUS, consensus)?;
        put_height(&mut wb, height)?;

        let mut cache = self.height_cache.lock().unwrap_or_else(PoisonError::into_inner);
        self.kv_store().write(wb);
        *cache = Some(height);
        Ok(())
    }

    fn kv_store(&self) -> MutexGuard<'_, K> {
        self.kv_store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn put<W: WriteBatch, T: BorshSerialize>(
    wb: &mut W,
    key: Key,
    key_bytes: &[u8],
    value: &T,
) -> Result<(), BlockStoreError> {
    let bytes = value
        .try_to_vec()
        .map_err(|err| BlockStoreError::SerializeValueError { key, source: err })?;
    wb.set(key_bytes, &bytes);
    Ok(())
}

fn put_height<W: WriteBatch>(wb: &mut W, height: BlockHeight) -> Result<(), BlockStoreError> {
    let mut bytes = Vec::with_capacity(8);
    write_u64(&mut bytes, height).map_err(|err| BlockStoreError::SerializeValueError {
        key: Key::Height,
        source: err,
    })?;
    wb.set(&variables::HEIGHT, &bytes);
    Ok(())
}

#[derive(Debug)]
pub enum BlockStoreError {
    /// No value is stored under `key`.
    NotFound { key: Key },
    DeserializeValueError { key: Key, source: std::io::Error },
    SerializeValueError { key: Key, source: std::io::Error },
}

impl From<KVGetError> for BlockStoreError {
    fn from(value: KVGetError) -> Self {
        match value {
            KVGetError::ValueExpectedButNotFound { key } => BlockStoreError::NotFound { key },
            KVGetError::DeserializeValueError { key, source } => {
                BlockStoreError::DeserializeValueError { key, source }
            }
        }
    }
}

impl Display for BlockStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BlockStoreError::NotFound { key } => write!(f, "{} not found", key),
            BlockStoreError::DeserializeValueError { key, source } => {
                write!(f, "failed to deserialize {}: {}", key, source)
            }
            BlockStoreError::SerializeValueError { key, source } => {
                write!(f, "failed to serialize {}: {}", key, source)
            }
        }
    }
}

impl std::error::Error for BlockStoreError {}
