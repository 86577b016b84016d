/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Read access to the chain, and the bootstrap procedure that ties a [`BlockStore`] to a genesis block.
//!
//! A `Blockchain` must be made [`ready`](Blockchain::ready) before any accessor is called. `ready`
//! installs the genesis block into an empty store, and refuses a store whose block at height 1 is not
//! the configured genesis block.
//!
//! ## Validator sets and certificates
//!
//! Both are recorded one block away from the block they apply to:
//! - The validator set that governs block `h` is the `next_validator_set` of block `h - 1` (or of the
//!   genesis block, for `h = 1`).
//! - The certificate for block `h` is the `last_block_consensus` of block `h + 1`. For the block at the
//!   chain height there is no successor yet, so its certificate is kept separately in the store.

use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::block_store::{pluggables::KVStore, BlockStore, BlockStoreError};
use crate::genesis::GenesisConfiguration;
use crate::types::{
    block::{Block, BlockBody, BlockHeader},
    consensus::Consensus,
    data_types::{BlockHeight, CryptoHash},
    validator_set::ValidatorSet,
};

pub struct Blockchain<K: KVStore> {
    block_store: Arc<BlockStore<K>>,
    genesis: Block,
    is_ready: AtomicBool,
}

impl<K: KVStore> Blockchain<K> {
    pub fn new(block_store: Arc<BlockStore<K>>, genesis: &GenesisConfiguration) -> Self {
        Self {
            block_store,
            genesis: genesis.block(),
            is_ready: AtomicBool::new(false),
        }
    }

    /// Install the genesis block if the store holds no block at all, then check that the block stored at height 1
    /// is the configured genesis block. Calling `ready` again after it has succeeded does nothing.
    ///
    /// The chain height is left untouched: a freshly bootstrapped store reports height 0 until the
    /// genesis block is applied together with its certificate.
    pub fn ready(&self) -> Result<(), BlockchainError> {
        if self.is_ready() {
            return Ok(());
        }

        self.block_store.with_lock(|| -> Result<(), BlockchainError> {
            if self.block_store.height()? != 0 {
                return Ok(());
            }
            match self.block_store.header(1) {
                // Left for the comparison below.
                Ok(_) => Ok(()),
                Err(BlockStoreError::NotFound { .. }) => {
                    self.block_store.set_header(1, &self.genesis.header)?;
                    self.block_store.set_body(1, &self.genesis.body)?;
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        })?;

        let stored = self.block_store.header(1)?.hash();
        let expected = self.genesis.hash();
        if stored != expected {
            return Err(BlockchainError::ChainMismatch { expected, stored });
        }

        self.is_ready.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::Acquire)
    }

    pub fn genesis(&self) -> &Block {
        &self.genesis
    }

    pub fn genesis_hash(&self) -> CryptoHash {
        self.genesis.hash()
    }

    pub fn block_store(&self) -> &Arc<BlockStore<K>> {
        &self.block_store
    }

    pub fn height(&self) -> Result<BlockHeight, BlockchainError> {
        self.check_ready()?;
        Ok(self.block_store.height()?)
    }

    pub fn hash_of(&self, height: BlockHeight) -> Result<CryptoHash, BlockchainError> {
        Ok(self.header_of(height)?.hash())
    }

    pub fn header_of(&self, height: BlockHeight) -> Result<BlockHeader, BlockchainError> {
        self.check_ready()?;
        Ok(self.block_store.header(height)?)
    }

    pub fn body_of(&self, height: BlockHeight) -> Result<BlockBody, BlockchainError> {
        self.check_ready()?;
        Ok(self.block_store.body(height)?)
    }

    pub fn block_of(&self, height: BlockHeight) -> Result<Block, BlockchainError> {
        Ok(Block::new(self.header_of(height)?, self.body_of(height)?))
    }

    /// Get the validator set that governs the block at `height`.
    pub fn validator_set_of(&self, height: BlockHeight) -> Result<ValidatorSet, BlockchainError> {
        let announced_at = height.saturating_sub(1).max(1);
        Ok(self.body_of(announced_at)?.next_validator_set)
    }

    /// Get the certificate for the block at `height`.
    ///
    /// Must not be called from inside [`BlockStore::with_lock`].
    pub fn consensus_of(&self, height: BlockHeight) -> Result<Consensus, BlockchainError> {
        self.check_ready()?;
        self.block_store.with_lock(|| -> Result<Consensus, BlockchainError> {
            if height == self.block_store.height()? {
                Ok(self.block_store.last_consensus()?)
            } else {
                Ok(self.block_store.body(height + 1)?.last_block_consensus)
            }
        })
    }

    fn check_ready(&self) -> Result<(), BlockchainError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(BlockchainError::NotReady)
        }
    }
}

#[derive(Debug)]
pub enum BlockchainError {
    /// An accessor was called before [`Blockchain::ready`] succeeded.
    NotReady,
    /// The block stored at height 1 is not the configured genesis block.
    ChainMismatch { expected: CryptoHash, stored: CryptoHash },
    BlockStoreError(BlockStoreError),
}

impl From<BlockStoreError> for BlockchainError {
    fn from(value: BlockStoreError) -> Self {
        BlockchainError::BlockStoreError(value)
    }
}

impl Display for BlockchainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::NotReady => write!(f, "blockchain accessed before it was ready"),
            BlockchainError::ChainMismatch { expected, stored } => write!(
                f,
                "stored genesis block {} does not match configured genesis block {}",
                stored, expected
            ),
            BlockchainError::BlockStoreError(err) => Display::fmt(err, f),
        }
    }
}

impl std::error::Error for BlockchainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BlockchainError::BlockStoreError(err) => Some(err),
            _ => None,
        }
    }
}
