//! Tests for the transaction pool: admission, capacity, selection, and updates after execution.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use poa_chain::{
    transaction_pool::{TransactionPool, TransactionPoolError},
    types::{merkle_tree::Hashable, transaction::Transaction},
};

fn transaction(data: &[u8]) -> Transaction {
    Transaction::new(data.to_vec())
}

#[test]
fn add_test() {
    let pool = TransactionPool::new(10, None);
    assert!(pool.is_empty());

    let first = transaction(b"first");
    assert_eq!(pool.add(first.clone()), Ok(()));
    assert!(pool.has(&first.hash()));
    assert!(!pool.has(&transaction(b"second").hash()));

    // The same payload is the same transaction.
    assert_eq!(pool.add(first), Err(TransactionPoolError::AlreadyPooled));
    assert_eq!(pool.len(), 1);
}

#[test]
fn add_invalid_test() {
    let pool = TransactionPool::new(
        10,
        Some(Box::new(|transaction: &Transaction| transaction.data() != b"invalid")),
    );

    assert_eq!(pool.add(transaction(b"invalid")), Err(TransactionPoolError::Invalid));
    assert!(pool.is_empty());
    assert_eq!(pool.add(transaction(b"valid")), Ok(()));
}

#[test]
fn add_to_full_pool_test() {
    let pool = TransactionPool::new(1, None);

    assert_eq!(pool.add(transaction(b"first")), Ok(()));
    assert_eq!(
        pool.add(transaction(b"second")),
        Err(TransactionPoolError::Full { capacity: 1 })
    );
    assert_eq!(pool.len(), 1);
    assert!(!pool.has(&transaction(b"second").hash()));
}

#[test]
fn select_test() {
    let pool = TransactionPool::new(10, None);

    // An empty pool never asks the selector.
    let selected = pool.select(|_| panic!("selector called on an empty pool"));
    assert!(selected.is_empty());

    for data in [b"c", b"a", b"b"] {
        pool.add(transaction(data)).unwrap();
    }

    // Oldest first.
    let selected = pool.select(|transactions| transactions);
    assert_eq!(selected, vec![transaction(b"c"), transaction(b"a"), transaction(b"b")]);

    let selected = pool.select(|transactions| transactions.into_iter().skip(1).take(1).collect());
    assert_eq!(selected, vec![transaction(b"a")]);

    // Selecting does not take anything out of the pool.
    assert_eq!(pool.len(), 3);
}

#[test]
fn update_test() {
    let valid = Arc::new(AtomicBool::new(true));
    let pool = {
        let valid = Arc::clone(&valid);
        TransactionPool::new(
            10,
            Some(Box::new(move |_: &Transaction| valid.load(Ordering::Acquire))),
        )
    };
    let (first, second) = (transaction(b"first"), transaction(b"second"));
    pool.add(first.clone()).unwrap();
    pool.add(second.clone()).unwrap();

    // Executed transactions leave the pool.
    pool.update(&[first.clone()]);
    assert!(!pool.has(&first.hash()));
    assert_eq!(pool.select(|transactions| transactions), vec![second.clone()]);

    // So do those that are no longer valid.
    valid.store(false, Ordering::Release);
    pool.update(&[]);
    assert!(pool.is_empty());

    // A freed slot can be reused, and an executed transaction can come back.
    valid.store(true, Ordering::Release);
    assert_eq!(pool.add(first), Ok(()));
}
