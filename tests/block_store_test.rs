//! Tests for the block store and the lock that serializes compound writes to it.

mod common;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use poa_chain::{
    block_store::{
        pluggables::{KVGet, Key},
        variables, BlockStore, BlockStoreError,
    },
    lock::Lock,
};

use crate::common::{
    fixtures::{genesis_configuration, keypairs, now, TestChain},
    mem_db::MemDB,
};

fn test_chain(height: u64) -> TestChain {
    let keypairs = keypairs(3);
    let genesis = genesis_configuration(&keypairs, now());
    let mut chain = TestChain::new(&genesis, keypairs);
    chain.extend(height as usize - 1, now());
    chain
}

#[test]
fn empty_store_test() {
    let block_store = BlockStore::new(MemDB::new());

    assert_eq!(block_store.height().unwrap(), 0);
    assert!(matches!(
        block_store.header(1),
        Err(BlockStoreError::NotFound {
            key: Key::Header { height: 1 }
        })
    ));
    assert!(matches!(
        block_store.body(3),
        Err(BlockStoreError::NotFound {
            key: Key::Body { height: 3 }
        })
    ));
    assert!(matches!(
        block_store.last_consensus(),
        Err(BlockStoreError::NotFound {
            key: Key::LastConsensus
        })
    ));
}

#[test]
fn set_and_get_test() {
    let chain = test_chain(2);
    let kv_store = MemDB::new();
    let block_store = BlockStore::new(kv_store.clone());

    let block = chain.block(2);
    block_store.set_header(2, &block.header).unwrap();
    block_store.set_body(2, &block.body).unwrap();
    block_store.set_last_consensus(&chain.consensus(2)).unwrap();
    block_store.set_height(2).unwrap();

    assert_eq!(block_store.header(2).unwrap(), block.header);
    assert_eq!(block_store.body(2).unwrap(), block.body);
    assert_eq!(block_store.last_consensus().unwrap(), chain.consensus(2));
    assert_eq!(block_store.height().unwrap(), 2);

    // The height is stored as a big-endian u64 under its own key.
    assert_eq!(kv_store.get(&variables::HEIGHT), Some(2u64.to_be_bytes().to_vec()));

    // A fresh store over the same key-value store reads the persisted height.
    let reopened = BlockStore::new(kv_store);
    assert_eq!(reopened.height().unwrap(), 2);
}

#[test]
fn extend_chain_test() {
    let chain = test_chain(3);
    let kv_store = MemDB::new();
    let block_store = BlockStore::new(kv_store.clone());

    for height in 1..=3 {
        let block = chain.block(height);
        block_store
            .extend_chain(&block.header, &block.body, &chain.consensus(height))
            .unwrap();
        assert_eq!(block_store.height().unwrap(), height);
    }

    assert_eq!(block_store.header(3).unwrap(), chain.block(3).header);
    assert_eq!(block_store.last_consensus().unwrap(), chain.consensus(3));
    // Height, last consensus, and a header and body for each block.
    assert_eq!(kv_store.len(), 2 + 2 * 3);
}

#[test]
fn set_tip_test() {
    let chain = test_chain(4);
    let block_store = BlockStore::new(MemDB::new());

    let genesis = chain.block(1);
    block_store
        .extend_chain(&genesis.header, &genesis.body, &chain.consensus(1))
        .unwrap();
    for height in 2..=4 {
        let block = chain.block(height);
        block_store.set_header(height, &block.header).unwrap();
        block_store.set_body(height, &block.body).unwrap();
    }
    assert_eq!(block_store.height().unwrap(), 1);

    block_store.set_tip(4, &chain.consensus(4)).unwrap();
    assert_eq!(block_store.height().unwrap(), 4);
    assert_eq!(block_store.last_consensus().unwrap(), chain.consensus(4));
}

#[test]
fn with_lock_serializes_tasks_test() {
    let block_store = Arc::new(BlockStore::new(MemDB::new()));
    let in_critical_section = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let block_store = Arc::clone(&block_store);
            let in_critical_section = Arc::clone(&in_critical_section);
            thread::spawn(move || {
                for _ in 0..10 {
                    block_store.with_lock(|| {
                        assert_eq!(in_critical_section.fetch_add(1, Ordering::SeqCst), 0);
                        let height = block_store.height().unwrap();
                        thread::sleep(Duration::from_micros(100));
                        block_store.set_height(height + 1).unwrap();
                        in_critical_section.fetch_sub(1, Ordering::SeqCst);
                    })
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(block_store.height().unwrap(), 40);
}

#[test]
fn lock_test() {
    let lock = Arc::new(Lock::new());
    assert!(!lock.is_locked());

    let holder = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || lock.use_exclusively(|| thread::sleep(Duration::from_millis(200))))
    };
    thread::sleep(Duration::from_millis(50));

    assert!(lock.is_locked());
    assert_eq!(lock.try_use(|| 1), None);

    holder.join().unwrap();
    assert!(!lock.is_locked());
    assert_eq!(lock.try_use(|| 1), Some(1));

    // A task that fails still releases the lock.
    let result: Result<(), &str> = lock.use_exclusively(|| Err("failed"));
    assert!(result.is_err());
    assert!(!lock.is_locked());
}
