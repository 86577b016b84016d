/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The pool of transactions waiting to be included in a block.
//!
//! Transactions enter the pool from peers' gossip and from [`Node::submit_transaction`](crate::node::Node::submit_transaction).
//! A transaction is pooled at most once, only if the application's validator accepts it, and only while
//! the pool holds fewer than its capacity. The node gossips a transaction onwards exactly when it first
//! enters the pool.
//!
//! The application that executes blocks calls [`update`](TransactionPool::update) with the transactions
//! it executed, and [`select`](TransactionPool::select) when it assembles a block.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::types::{data_types::CryptoHash, merkle_tree::Hashable, transaction::Transaction};

/// Decides whether a transaction may be pooled. Called without the pool's lock held.
pub type TransactionValidator = Box<dyn Fn(&Transaction) -> bool + Send + Sync>;

pub const DEFAULT_MAX_POOLED_TRANSACTIONS: usize = 1000;

pub struct TransactionPool {
    capacity: usize,
    validator: Option<TransactionValidator>,
    pooled: Mutex<Pooled>,
}

#[derive(Default)]
struct Pooled {
    transactions: HashMap<CryptoHash, (u64, Transaction)>,
    // Arrival counter. Orders the pool's contents.
    next_seq: u64,
}

impl Pooled {
    fn can_add(&self, hash: &CryptoHash, capacity: usize) -> Result<(), TransactionPoolError> {
        if self.transactions.contains_key(hash) {
            return Err(TransactionPoolError::AlreadyPooled);
        }
        if self.transactions.len() >= capacity {
            return Err(TransactionPoolError::Full { capacity });
        }
        Ok(())
    }
}

impl TransactionPool {
    /// Create an empty pool holding at most `capacity` transactions. Without a `validator` every
    /// transaction is accepted.
    pub fn new(capacity: usize, validator: Option<TransactionValidator>) -> Self {
        Self {
            capacity,
            validator,
            pooled: Mutex::new(Pooled::default()),
        }
    }

    pub fn has(&self, hash: &CryptoHash) -> bool {
        self.pooled().transactions.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.pooled().transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pooled().transactions.is_empty()
    }

    /// Pool `transaction`. Succeeds only for a transaction that was not pooled before, that the validator
    /// accepts, and that fits.
    pub fn add(&self, transaction: Transaction) -> Result<(), TransactionPoolError> {
        let hash = transaction.hash();
        self.pooled().can_add(&hash, self.capacity)?;

        if !self.is_valid(&transaction) {
            return Err(TransactionPoolError::Invalid);
        }

        // Another thread may have pooled the same transaction, or filled the pool, while this one was
        // validating.
        let mut pooled = self.pooled();
        pooled.can_add(&hash, self.capacity)?;
        let seq = pooled.next_seq;
        pooled.next_seq += 1;
        pooled.transactions.insert(hash, (seq, transaction));
        Ok(())
    }

    /// Forget the `executed` transactions, then run the validator again over the rest and forget those it
    /// now rejects.
    pub fn update(&self, executed: &[Transaction]) {
        let remaining = {
            let mut pooled = self.pooled();
            for transaction in executed {
                pooled.transactions.remove(&transaction.hash());
            }
            sorted(&pooled)
        };

        let invalid: Vec<CryptoHash> = remaining
            .iter()
            .filter(|transaction| !self.is_valid(transaction))
            .map(|transaction| transaction.hash())
            .collect();

        let mut pooled = self.pooled();
        for hash in invalid {
            pooled.transactions.remove(&hash);
        }
    }

    /// Hand the pooled transactions, oldest first, to `selector` and return what it picks. An empty pool
    /// selects nothing without calling `selector`.
    pub fn select(
        &self,
        selector: impl FnOnce(Vec<Transaction>) -> Vec<Transaction>,
    ) -> Vec<Transaction> {
        let transactions = sorted(&self.pooled());
        if transactions.is_empty() {
            return Vec::new();
        }
        selector(transactions)
    }

    fn is_valid(&self, transaction: &Transaction) -> bool {
        self.validator
            .as_ref()
            .map_or(true, |validator| validator(transaction))
    }

    fn pooled(&self) -> MutexGuard<'_, Pooled> {
        self.pooled.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sorted(pooled: &Pooled) -> Vec<Transaction> {
    let mut transactions: Vec<&(u64, Transaction)> = pooled.transactions.values().collect();
    transactions.sort_by_key(|(seq, _)| *seq);
    transactions
        .into_iter()
        .map(|(_, transaction)| transaction.clone())
        .collect()
}

/// Why a transaction was not pooled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionPoolError {
    AlreadyPooled,
    Full { capacity: usize },
    Invalid,
}

impl Display for TransactionPoolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TransactionPoolError::AlreadyPooled => write!(f, "transaction is already pooled"),
            TransactionPoolError::Full { capacity } => {
                write!(f, "transaction pool is full ({} transactions)", capacity)
            }
            TransactionPoolError::Invalid => write!(f, "transaction was rejected by the validator"),
        }
    }
}

impl std::error::Error for TransactionPoolError {}
