/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable block store persistence.
//!
//! The library user provides a key-value store by implementing [`KVStore`], [`KVGet`], and
//! [`WriteBatch`]. Only [`KVGet::get`] has to be written by hand: the typed getters that read the
//! [state variables](super::variables) are provided methods.

use std::fmt::{self, Display, Formatter};

use borsh::BorshDeserialize;

use crate::types::{
    block::{BlockBody, BlockHeader},
    consensus::Consensus,
    data_types::BlockHeight,
    serialization::read_u64,
};

use super::variables;

pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;

    /// Atomically apply every insertion in `wb`.
    fn write(&mut self, wb: Self::WriteBatch);
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /* ↓↓↓ Chain Height ↓↓↓ */

    fn height(&self) -> Result<Option<BlockHeight>, KVGetError> {
        match self.get(&variables::HEIGHT) {
            None => Ok(None),
            Some(bytes) => Ok(Some(read_u64(&mut bytes.as_slice()).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::Height,
                    source: err,
                }
            })?)),
        }
    }

    /* ↓↓↓ Last Consensus ↓↓↓ */

    fn last_consensus(&self) -> Result<Consensus, KVGetError> {
        expect_value(self.get(&variables::LAST_CONSENSUS), Key::LastConsensus)
    }

    /* ↓↓↓ Headers and Bodies ↓↓↓ */

    fn header(&self, height: BlockHeight) -> Result<BlockHeader, KVGetError> {
        expect_value(self.get(&variables::header_key(height)), Key::Header { height })
    }

    fn body(&self, height: BlockHeight) -> Result<BlockBody, KVGetError> {
        expect_value(self.get(&variables::body_key(height)), Key::Body { height })
    }
}

fn expect_value<T: BorshDeserialize>(bytes: Option<Vec<u8>>, key: Key) -> Result<T, KVGetError> {
    let bytes = bytes.ok_or(KVGetError::ValueExpectedButNotFound { key })?;
    T::try_from_slice(&bytes)
        .map_err(|err| KVGetError::DeserializeValueError { key, source: err })
}

/// Error when trying to read a value corresponding to a given key from the [key value store][KVStore].
/// The error may arise in the following circumstances:
/// 1. The value corresponding to a given key cannot be deserialized into its expected type, or
/// 2. The value corresponding to a given key cannot be found.
#[derive(Debug)]
pub enum KVGetError {
    DeserializeValueError { key: Key, source: std::io::Error },
    ValueExpectedButNotFound { key: Key },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Height,
    LastConsensus,
    Header { height: BlockHeight },
    Body { height: BlockHeight },
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Key::Height => write!(f, "Chain Height"),
            Key::LastConsensus => write!(f, "Last Consensus"),
            Key::Header { height } => write!(f, "Header at height {}", height),
            Key::Body { height } => write!(f, "Body at height {}", height),
        }
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
}
