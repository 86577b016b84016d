/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [`Block`] type and its two halves, [`BlockHeader`] and [`BlockBody`].
//!
//! The header commits to the body through three roots: the transaction root, the root of the consensus
//! certificate for the previous block, and the root of the validator set that will govern the next
//! block. Headers can therefore be fetched and linked by hash before their bodies arrive, and each body
//! checked against its header afterwards with [`BlockBody::validate`].

use std::fmt::{self, Display, Formatter};
use std::io::{self, Read, Write};

use borsh::{BorshDeserialize, BorshSerialize};

use super::consensus::Consensus;
use super::crypto_primitives::hash;
use super::data_types::{BlockHeight, CryptoHash, Timestamp};
use super::merkle_tree::Hashable;
use super::serialization::{read_u64, write_u64};
use super::transaction::{Transaction, TransactionList};
use super::validator_set::ValidatorSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub height: BlockHeight,
    pub timestamp: Timestamp,
    pub last_block_hash: CryptoHash,
    pub transaction_root: CryptoHash,
    pub last_block_consensus_root: CryptoHash,
    pub next_validator_set_root: CryptoHash,
    pub app_state_hash: CryptoHash,
}

impl BlockHeader {
    /// Hash of the serialized header. Identifies the block.
    pub fn hash(&self) -> CryptoHash {
        let mut bytes = Vec::with_capacity(8 + 8 + 32 * 5);
        bytes.extend_from_slice(&self.height.to_be_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        for root in [
            &self.last_block_hash,
            &self.transaction_root,
            &self.last_block_consensus_root,
            &self.next_validator_set_root,
            &self.app_state_hash,
        ] {
            bytes.extend_from_slice(&root.bytes());
        }
        hash(&bytes)
    }
}

impl BorshSerialize for BlockHeader {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u64(writer, self.height)?;
        write_u64(writer, self.timestamp)?;
        self.last_block_hash.serialize(writer)?;
        self.transaction_root.serialize(writer)?;
        self.last_block_consensus_root.serialize(writer)?;
        self.next_validator_set_root.serialize(writer)?;
        self.app_state_hash.serialize(writer)
    }
}

impl BorshDeserialize for BlockHeader {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            height: read_u64(reader)?,
            timestamp: read_u64(reader)?,
            last_block_hash: CryptoHash::deserialize_reader(reader)?,
            transaction_root: CryptoHash::deserialize_reader(reader)?,
            last_block_consensus_root: CryptoHash::deserialize_reader(reader)?,
            next_validator_set_root: CryptoHash::deserialize_reader(reader)?,
            app_state_hash: CryptoHash::deserialize_reader(reader)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockBody {
    pub transactions: TransactionList,
    /// The certificate for the block at `height - 1`.
    pub last_block_consensus: Consensus,
    /// The validator set that governs the block at `height + 1`.
    pub next_validator_set: ValidatorSet,
}

impl BlockBody {
    /// Check that every root committed to by `header` matches this body.
    pub fn validate(&self, header: &BlockHeader) -> Result<(), BlockError> {
        if header.transaction_root != self.transactions.hash() {
            return Err(BlockError::TransactionRootMismatch);
        }
        if header.last_block_consensus_root != self.last_block_consensus.hash() {
            return Err(BlockError::LastBlockConsensusRootMismatch);
        }
        if header.next_validator_set_root != self.next_validator_set.hash() {
            return Err(BlockError::NextValidatorSetRootMismatch);
        }
        Ok(())
    }
}

impl BorshSerialize for BlockBody {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.transactions.serialize(writer)?;
        self.last_block_consensus.serialize(writer)?;
        self.next_validator_set.serialize(writer)
    }
}

impl BorshDeserialize for BlockBody {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            transactions: TransactionList::deserialize_reader(reader)?,
            last_block_consensus: Consensus::deserialize_reader(reader)?,
            next_validator_set: ValidatorSet::deserialize_reader(reader)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BlockBody,
}

impl Block {
    pub fn new(header: BlockHeader, body: BlockBody) -> Self {
        Self { header, body }
    }

    /// Build a block whose header roots are computed from the given body contents.
    pub fn construct(
        height: BlockHeight,
        timestamp: Timestamp,
        last_block_hash: CryptoHash,
        app_state_hash: CryptoHash,
        transactions: Vec<Transaction>,
        last_block_consensus: Consensus,
        next_validator_set: ValidatorSet,
    ) -> Self {
        let transactions = TransactionList::new(transactions);
        let header = BlockHeader {
            height,
            timestamp,
            last_block_hash,
            transaction_root: transactions.hash(),
            last_block_consensus_root: last_block_consensus.hash(),
            next_validator_set_root: next_validator_set.hash(),
            app_state_hash,
        };
        Self {
            header,
            body: BlockBody {
                transactions,
                last_block_consensus,
                next_validator_set,
            },
        }
    }

    pub fn height(&self) -> BlockHeight {
        self.header.height
    }

    pub fn hash(&self) -> CryptoHash {
        self.header.hash()
    }

    pub fn validate(&self) -> Result<(), BlockError> {
        self.body.validate(&self.header)
    }
}

impl BorshSerialize for Block {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.header.serialize(writer)?;
        self.body.serialize(writer)
    }
}

impl BorshDeserialize for Block {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            header: BlockHeader::deserialize_reader(reader)?,
            body: BlockBody::deserialize_reader(reader)?,
        })
    }
}

/// A block whose body does not match the roots committed to by its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    TransactionRootMismatch,
    LastBlockConsensusRootMismatch,
    NextValidatorSetRootMismatch,
}

impl Display for BlockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let root = match self {
            BlockError::TransactionRootMismatch => "transaction root",
            BlockError::LastBlockConsensusRootMismatch => "last block consensus root",
            BlockError::NextValidatorSetRootMismatch => "next validator set root",
        };
        write!(f, "block body does not match the header's {}", root)
    }
}

impl std::error::Error for BlockError {}
