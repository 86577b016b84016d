/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Opaque transactions and ordered lists of them.

use std::io::{self, Read, Write};

use borsh::{BorshDeserialize, BorshSerialize};

use super::crypto_primitives::hash;
use super::data_types::CryptoHash;
use super::merkle_tree::{merkle_root, Hashable};
use super::serialization::{read_list, read_sized_bytes, write_list, write_sized_bytes};

/// Application payload bytes. The chain core never interprets them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    data: Vec<u8>,
}

impl Transaction {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// The hash of a transaction is the hash of its payload, not of its length-prefixed encoding.
impl Hashable for Transaction {
    fn hash(&self) -> CryptoHash {
        hash(&self.data)
    }
}

impl BorshSerialize for Transaction {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_sized_bytes(writer, &self.data)
    }
}

impl BorshDeserialize for Transaction {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self::new(read_sized_bytes(reader)?))
    }
}

/// Ordered sequence of transactions included in a block.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TransactionList(Vec<Transaction>);

impl TransactionList {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self(transactions)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Hashable for TransactionList {
    fn hash(&self) -> CryptoHash {
        merkle_root(&self.0)
    }
}

impl BorshSerialize for TransactionList {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_list(writer, &self.0)
    }
}

impl BorshDeserialize for TransactionList {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self(read_list(reader)?))
    }
}
