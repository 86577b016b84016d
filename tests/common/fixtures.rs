//! Keys, genesis configurations, and certified chains for tests.

use std::time::SystemTime;

use ed25519_dalek::SigningKey;
use rand_core::OsRng;

use poa_chain::{
    genesis::GenesisConfiguration,
    types::{
        block::Block,
        consensus::Consensus,
        crypto_primitives::Keypair,
        data_types::{BlockHeight, CryptoHash, Timestamp},
        transaction::Transaction,
        validator_set::Validator,
    },
};

pub(crate) fn keypairs(count: usize) -> Vec<Keypair> {
    let mut csprg = OsRng {};
    (0..count)
        .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
        .collect()
}

/// One validator per keypair, all with the same `power`.
pub(crate) fn validators(keypairs: &[Keypair], power: u64) -> Vec<Validator> {
    keypairs
        .iter()
        .map(|keypair| Validator::new(keypair.address(), power))
        .collect()
}

pub(crate) fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// A certificate for `hash` signed by every keypair in `signers`.
pub(crate) fn sign(signers: &[Keypair], hash: &CryptoHash) -> Consensus {
    Consensus::new(signers.iter().map(|keypair| keypair.sign(hash)).collect())
}

pub(crate) fn genesis_configuration(signers: &[Keypair], timestamp: Timestamp) -> GenesisConfiguration {
    GenesisConfiguration::builder()
        .timestamp(timestamp)
        .unique(b"poa-chain tests".to_vec())
        .validator_set(validators(signers, 10))
        .build()
}

/// A chain of certified blocks starting from the genesis block, signed by a fixed set of validators.
pub(crate) struct TestChain {
    validators: Vec<Keypair>,
    // `blocks[i]` is the block at height `i + 1`.
    blocks: Vec<(Block, Consensus)>,
}

impl TestChain {
    pub(crate) fn new(genesis: &GenesisConfiguration, validators: Vec<Keypair>) -> TestChain {
        let genesis = genesis.block();
        let consensus = sign(&validators, &genesis.hash());
        TestChain {
            validators,
            blocks: vec![(genesis, consensus)],
        }
    }

    /// Append `count` blocks with the given timestamp, each carrying one transaction.
    pub(crate) fn extend(&mut self, count: usize, timestamp: Timestamp) {
        for _ in 0..count {
            let (last_block, last_consensus) = self.blocks.last().unwrap().clone();
            let height = last_block.height() + 1;
            let block = Block::construct(
                height,
                timestamp,
                last_block.hash(),
                CryptoHash::zero(),
                vec![Transaction::new(height.to_be_bytes().to_vec())],
                last_consensus,
                last_block.body.next_validator_set.clone(),
            );
            let consensus = sign(&self.validators, &block.hash());
            self.blocks.push((block, consensus));
        }
    }

    pub(crate) fn height(&self) -> BlockHeight {
        self.blocks.len() as BlockHeight
    }

    pub(crate) fn block(&self, height: BlockHeight) -> Block {
        self.blocks[height as usize - 1].0.clone()
    }

    pub(crate) fn consensus(&self, height: BlockHeight) -> Consensus {
        self.blocks[height as usize - 1].1.clone()
    }
}
