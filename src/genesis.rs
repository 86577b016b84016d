/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The configured first block of a chain.
//!
//! Every node of a chain must be configured with the same `GenesisConfiguration`. Its block is
//! compared byte-for-byte against whatever is stored at height 1 when the node starts, and its hash is
//! exchanged in the handshake so that nodes of different chains never sync with each other.
//!
//! ```ignore
//! let genesis =
//!     GenesisConfiguration::builder()
//!     .timestamp(1_700_000_000)
//!     .unique(b"devnet-3".to_vec())
//!     .validator_set(validators)
//!     .build()
//! ```

use typed_builder::TypedBuilder;

use crate::types::{
    block::Block,
    consensus::Consensus,
    crypto_primitives::hash,
    data_types::{CryptoHash, Timestamp},
    validator_set::{Validator, ValidatorSet},
};

#[derive(Clone, TypedBuilder)]
pub struct GenesisConfiguration {
    #[builder(setter(doc = "Set the timestamp of the genesis block, in seconds since the Unix Epoch. Required."))]
    pub timestamp: Timestamp,
    #[builder(setter(doc = "Set the bytes that distinguish this chain from others. Their hash becomes the genesis block's `last_block_hash`. Required."))]
    pub unique: Vec<u8>,
    #[builder(setter(doc = "Set the validator set that certifies the genesis block and the block at height 2. Required."))]
    pub validator_set: Vec<Validator>,
}

impl GenesisConfiguration {
    pub fn block(&self) -> Block {
        Block::construct(
            1,
            self.timestamp,
            hash(&self.unique),
            CryptoHash::zero(),
            Vec::new(),
            Consensus::empty(),
            ValidatorSet::new(self.validator_set.clone()),
        )
    }
}
