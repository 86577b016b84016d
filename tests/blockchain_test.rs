//! Tests for bootstrapping the chain from its genesis configuration and reading it back.

mod common;

use std::sync::Arc;

use poa_chain::{
    block_store::BlockStore,
    blockchain::{Blockchain, BlockchainError},
    types::validator_set::{Validator, ValidatorSet},
};

use crate::common::{
    fixtures::{genesis_configuration, keypairs, now, validators, TestChain},
    mem_db::MemDB,
};

#[test]
fn ready_installs_genesis_test() {
    let keypairs = keypairs(3);
    let genesis = genesis_configuration(&keypairs, now());
    let block_store = Arc::new(BlockStore::new(MemDB::new()));
    let blockchain = Blockchain::new(Arc::clone(&block_store), &genesis);

    assert!(!blockchain.is_ready());
    assert!(matches!(blockchain.height(), Err(BlockchainError::NotReady)));
    assert!(matches!(blockchain.header_of(1), Err(BlockchainError::NotReady)));

    blockchain.ready().unwrap();
    assert!(blockchain.is_ready());

    // The genesis block is stored but not yet applied.
    assert_eq!(blockchain.height().unwrap(), 0);
    assert_eq!(blockchain.block_of(1).unwrap(), genesis.block());
    assert_eq!(blockchain.genesis_hash(), genesis.block().hash());
    assert_eq!(
        blockchain.validator_set_of(1).unwrap(),
        ValidatorSet::new(validators(&keypairs, 10))
    );

    // Calling `ready` again changes nothing.
    blockchain.ready().unwrap();
    assert_eq!(blockchain.height().unwrap(), 0);
}

#[test]
fn ready_accepts_own_chain_test() {
    let keypairs = keypairs(3);
    let genesis = genesis_configuration(&keypairs, now());
    let mut chain = TestChain::new(&genesis, keypairs);
    chain.extend(2, now());

    let kv_store = MemDB::new();
    let block_store = Arc::new(BlockStore::new(kv_store.clone()));
    for height in 1..=3 {
        let block = chain.block(height);
        block_store
            .extend_chain(&block.header, &block.body, &chain.consensus(height))
            .unwrap();
    }

    let blockchain = Blockchain::new(Arc::new(BlockStore::new(kv_store)), &genesis);
    blockchain.ready().unwrap();
    assert_eq!(blockchain.height().unwrap(), 3);
}

#[test]
fn ready_rejects_other_chain_test() {
    let keypairs = keypairs(3);
    let kv_store = MemDB::new();

    let genesis = genesis_configuration(&keypairs, now());
    Blockchain::new(Arc::new(BlockStore::new(kv_store.clone())), &genesis)
        .ready()
        .unwrap();

    let other_genesis = genesis_configuration(&keypairs[..2], now());
    let blockchain = Blockchain::new(Arc::new(BlockStore::new(kv_store)), &other_genesis);
    match blockchain.ready() {
        Err(BlockchainError::ChainMismatch { expected, stored }) => {
            assert_eq!(expected, other_genesis.block().hash());
            assert_eq!(stored, genesis.block().hash());
        }
        _ => panic!("expected a chain mismatch"),
    }
    assert!(!blockchain.is_ready());
}

#[test]
fn accessors_test() {
    let keypairs = keypairs(3);
    let genesis = genesis_configuration(&keypairs, now());
    let mut chain = TestChain::new(&genesis, keypairs.clone());
    chain.extend(3, now());

    let block_store = Arc::new(BlockStore::new(MemDB::new()));
    let blockchain = Blockchain::new(Arc::clone(&block_store), &genesis);
    blockchain.ready().unwrap();
    for height in 1..=4 {
        let block = chain.block(height);
        block_store
            .extend_chain(&block.header, &block.body, &chain.consensus(height))
            .unwrap();
    }

    assert_eq!(blockchain.height().unwrap(), 4);
    assert_eq!(blockchain.hash_of(3).unwrap(), chain.block(3).hash());
    assert_eq!(blockchain.body_of(2).unwrap(), chain.block(2).body);

    // The certificate of the tip is the last consensus; every other certificate is carried by the
    // block above it.
    assert_eq!(blockchain.consensus_of(4).unwrap(), chain.consensus(4));
    assert_eq!(blockchain.consensus_of(2).unwrap(), chain.consensus(2));
    assert_eq!(blockchain.consensus_of(1).unwrap(), chain.consensus(1));

    // Every block in this chain carries the genesis validator set forward.
    let genesis_set = ValidatorSet::new(
        keypairs
            .iter()
            .map(|keypair| Validator::new(keypair.address(), 10))
            .collect(),
    );
    for height in 1..=4 {
        assert_eq!(blockchain.validator_set_of(height).unwrap(), genesis_set);
    }

    assert!(matches!(
        blockchain.header_of(5),
        Err(BlockchainError::BlockStoreError(_))
    ));
}
