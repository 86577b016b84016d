//! Tests for hashing, Merkle roots, certificates, and the wire encoding of the core types.

mod common;

use borsh::{BorshDeserialize, BorshSerialize};

use poa_chain::{
    block_sync::messages::{SyncRequest, SyncResponse},
    networking::messages::{GossipMessage, Message},
    types::{
        block::{Block, BlockError},
        consensus::{Consensus, ConsensusError},
        crypto_primitives::{hash, Signature},
        data_types::CryptoHash,
        merkle_tree::{merkle_root, Hashable},
        transaction::Transaction,
        validator_set::{Validator, ValidatorSet},
        MAX_SAFE_INTEGER,
    },
};

use crate::common::fixtures::{genesis_configuration, keypairs, now, sign, validators, TestChain};

fn leaf(byte: u8) -> CryptoHash {
    hash(&[byte])
}

fn pair(left: CryptoHash, right: CryptoHash) -> CryptoHash {
    let mut bytes = left.bytes().to_vec();
    bytes.extend_from_slice(&right.bytes());
    hash(&bytes)
}

#[test]
fn merkle_root_test() {
    let (a, b, c, d, e) = (leaf(1), leaf(2), leaf(3), leaf(4), leaf(5));

    assert_eq!(merkle_root::<CryptoHash>(&[]), hash(&[]));
    assert_eq!(merkle_root(&[a]), a);
    assert_eq!(merkle_root(&[a, b]), pair(a, b));
    assert_eq!(merkle_root(&[a, b, c]), pair(pair(a, b), c));
    assert_eq!(
        merkle_root(&[a, b, c, d, e]),
        pair(pair(pair(a, b), pair(c, d)), e)
    );
}

#[test]
fn transaction_hash_covers_payload_only_test() {
    let transaction = Transaction::new(b"transfer".to_vec());
    assert_eq!(transaction.hash(), hash(b"transfer"));
}

#[test]
fn validator_set_test() {
    let keypairs = keypairs(3);
    let validator_set = ValidatorSet::new(vec![
        Validator::new(keypairs[0].address(), 5),
        Validator::new(keypairs[1].address(), 7),
    ]);

    assert_eq!(validator_set.len(), 2);
    assert_eq!(validator_set.total_power(), 12);
    assert_eq!(validator_set.power_of(&keypairs[1].address()), Some(7));
    assert!(!validator_set.contains(&keypairs[2].address()));

    let mut validator_bytes = keypairs[0].address().bytes().to_vec();
    validator_bytes.extend_from_slice(&5u64.to_be_bytes());
    assert_eq!(validator_set.validators()[0].hash(), hash(&validator_bytes));
}

#[test]
fn consensus_validate_test() {
    let keypairs = keypairs(4);
    let validator_set = ValidatorSet::new(validators(&keypairs, 10));
    let message = hash(b"block");

    // 30 of 40 is at least two thirds.
    assert_eq!(sign(&keypairs[..3], &message).validate(&message, &validator_set), Ok(()));

    // 20 of 40 is not.
    assert_eq!(
        sign(&keypairs[..2], &message).validate(&message, &validator_set),
        Err(ConsensusError::InsufficientPower { signed: 20, total: 40 })
    );

    // Signed over a different message.
    assert_eq!(
        sign(&keypairs[..3], &hash(b"other")).validate(&message, &validator_set),
        Err(ConsensusError::UnrecoverableSignature)
    );
}

#[test]
fn consensus_exactly_two_thirds_test() {
    let keypairs = keypairs(3);
    let validator_set = ValidatorSet::new(validators(&keypairs, 10));
    let message = hash(b"block");

    // 20 of 30 is exactly two thirds.
    assert_eq!(sign(&keypairs[..2], &message).validate(&message, &validator_set), Ok(()));
    assert_eq!(
        sign(&keypairs[..1], &message).validate(&message, &validator_set),
        Err(ConsensusError::InsufficientPower { signed: 10, total: 30 })
    );
}

#[test]
fn consensus_rejects_unknown_duplicate_and_corrupted_signers_test() {
    let keypairs = keypairs(4);
    let validator_set = ValidatorSet::new(validators(&keypairs[..3], 10));
    let message = hash(b"block");

    let outsider = sign(&keypairs[1..], &message);
    assert_eq!(
        outsider.validate(&message, &validator_set),
        Err(ConsensusError::UnknownSigner {
            address: keypairs[3].address()
        })
    );

    let signature = keypairs[0].sign(&message);
    let duplicated = Consensus::new(vec![signature, signature, keypairs[1].sign(&message)]);
    assert_eq!(
        duplicated.validate(&message, &validator_set),
        Err(ConsensusError::DuplicateSigner {
            address: keypairs[0].address()
        })
    );

    let mut signature_bytes = signature.signature_bytes();
    signature_bytes[0] ^= 0xff;
    let corrupted = Consensus::new(vec![
        Signature::new(signature.signer_bytes(), signature_bytes),
        keypairs[1].sign(&message),
        keypairs[2].sign(&message),
    ]);
    assert_eq!(
        corrupted.validate(&message, &validator_set),
        Err(ConsensusError::UnrecoverableSignature)
    );
}

#[test]
fn block_validate_test() {
    let keypairs = keypairs(3);
    let genesis = genesis_configuration(&keypairs, now());
    let mut chain = TestChain::new(&genesis, keypairs);
    chain.extend(1, now());

    let block = chain.block(2);
    assert_eq!(block.validate(), Ok(()));
    assert_eq!(block.height(), 2);
    assert_eq!(block.header.last_block_hash, genesis.block().hash());

    let mut tampered = block.clone();
    tampered.body.transactions = Default::default();
    assert_eq!(tampered.validate(), Err(BlockError::TransactionRootMismatch));

    let mut tampered = block.clone();
    tampered.body.last_block_consensus = Consensus::empty();
    assert_eq!(tampered.validate(), Err(BlockError::LastBlockConsensusRootMismatch));

    let mut tampered = block;
    tampered.body.next_validator_set = ValidatorSet::empty();
    assert_eq!(tampered.validate(), Err(BlockError::NextValidatorSetRootMismatch));
}

#[test]
fn genesis_block_test() {
    let keypairs = keypairs(3);
    let genesis = genesis_configuration(&keypairs, 1_700_000_000);
    let block = genesis.block();

    assert_eq!(block.height(), 1);
    assert_eq!(block.header.timestamp, 1_700_000_000);
    assert_eq!(block.header.last_block_hash, hash(b"poa-chain tests"));
    assert_eq!(block.header.app_state_hash, CryptoHash::zero());
    assert!(block.body.transactions.is_empty());
    assert_eq!(block.body.last_block_consensus, Consensus::empty());
    assert_eq!(block.body.next_validator_set, ValidatorSet::new(validators(&keypairs, 10)));
    assert_eq!(block.validate(), Ok(()));

    // Same configuration, same genesis block.
    assert_eq!(genesis.block().hash(), block.hash());
}

#[test]
fn serialization_test() {
    let keypairs = keypairs(3);
    let genesis = genesis_configuration(&keypairs, now());
    let mut chain = TestChain::new(&genesis, keypairs);
    chain.extend(1, now());

    let block = chain.block(2);
    let bytes = block.try_to_vec().unwrap();
    assert_eq!(Block::try_from_slice(&bytes).unwrap(), block);

    // Height and timestamp lead the header, big-endian.
    assert_eq!(&bytes[..8], &2u64.to_be_bytes());

    let message: Message = GossipMessage::NewBlock {
        block: block.clone(),
        consensus: chain.consensus(2),
    }
    .into();
    let bytes = message.try_to_vec().unwrap();
    assert_eq!(bytes[0], message.tag());
    match Message::try_from_slice(&bytes).unwrap() {
        Message::GossipMessage(GossipMessage::NewBlock { block: decoded, consensus }) => {
            assert_eq!(decoded, block);
            assert_eq!(consensus, chain.consensus(2));
        }
        _ => panic!("decoded a different message"),
    }

    let request: Message = SyncRequest::GetHeaders { from: 7, count: 3 }.into();
    match Message::try_from_slice(&request.try_to_vec().unwrap()).unwrap() {
        Message::SyncRequest(SyncRequest::GetHeaders { from, count }) => {
            assert_eq!((from, count), (7, 3))
        }
        _ => panic!("decoded a different message"),
    }

    let response: Message = SyncResponse::Bodies(vec![block.body.clone()]).into();
    match Message::try_from_slice(&response.try_to_vec().unwrap()).unwrap() {
        Message::SyncResponse(SyncResponse::Bodies(bodies)) => assert_eq!(bodies, vec![block.body]),
        _ => panic!("decoded a different message"),
    }
}

#[test]
fn serialization_rejects_out_of_range_integers_test() {
    let too_large: Message = GossipMessage::NewBlockHeight {
        height: MAX_SAFE_INTEGER + 1,
    }
    .into();
    assert!(too_large.try_to_vec().is_err());

    let largest: Message = GossipMessage::NewBlockHeight {
        height: MAX_SAFE_INTEGER,
    }
    .into();
    assert!(largest.try_to_vec().is_ok());

    let mut bytes = largest.try_to_vec().unwrap();
    bytes[1..9].copy_from_slice(&u64::MAX.to_be_bytes());
    assert!(Message::try_from_slice(&bytes).is_err());
}

#[test]
fn deserialization_rejects_unknown_tag_test() {
    let mut bytes = Message::hello(3, CryptoHash::zero()).try_to_vec().unwrap();
    bytes[0] = 0x7f;
    assert!(Message::try_from_slice(&bytes).is_err());
}
