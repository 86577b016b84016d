//! Tests for how the sync server answers requests from the local chain.

mod common;

use std::sync::Arc;

use poa_chain::{
    block_store::BlockStore,
    block_sync::{
        messages::{SyncRequest, SyncResponse},
        server::{SyncServer, SyncServerError},
    },
    blockchain::Blockchain,
};

use crate::common::{
    fixtures::{genesis_configuration, keypairs, now, TestChain},
    mem_db::MemDB,
};

/// A server over a chain of height 5 that sends at most 3 headers and 2 bodies per response.
fn server() -> (SyncServer<MemDB>, TestChain) {
    let validators = keypairs(3);
    let genesis = genesis_configuration(&validators, now());
    let mut chain = TestChain::new(&genesis, validators);
    chain.extend(4, now());

    let block_store = Arc::new(BlockStore::new(MemDB::new()));
    let blockchain = Arc::new(Blockchain::new(Arc::clone(&block_store), &genesis));
    blockchain.ready().unwrap();
    for height in 1..=5 {
        let block = chain.block(height);
        block_store
            .extend_chain(&block.header, &block.body, &chain.consensus(height))
            .unwrap();
    }

    (SyncServer::new(blockchain, 3, 2), chain)
}

fn header_heights(response: SyncResponse) -> Vec<u64> {
    match response {
        SyncResponse::Headers(headers) => headers.iter().map(|header| header.height).collect(),
        _ => panic!("expected headers"),
    }
}

#[test]
fn consented_header_test() {
    let (server, chain) = server();

    for height in [1, 3, 5] {
        match server.serve(&SyncRequest::GetConsentedHeader { height }).unwrap() {
            SyncResponse::ConsentedHeader { header, consensus } => {
                assert_eq!(header, chain.block(height).header);
                assert_eq!(consensus, chain.consensus(height));
            }
            _ => panic!("expected a consented header"),
        }
    }

    assert!(matches!(
        server.serve(&SyncRequest::GetConsentedHeader { height: 6 }),
        Err(SyncServerError::BeyondChain { height: 6, tip: 5 })
    ));
    assert!(matches!(
        server.serve(&SyncRequest::GetConsentedHeader { height: 0 }),
        Err(SyncServerError::BeyondChain { height: 0, tip: 5 })
    ));
}

#[test]
fn headers_test() {
    let (server, _) = server();

    let serve = |from, count| header_heights(server.serve(&SyncRequest::GetHeaders { from, count }).unwrap());

    assert_eq!(serve(2, 2), vec![2, 3]);
    // Capped by the server's limit.
    assert_eq!(serve(1, 100), vec![1, 2, 3]);
    // Capped by the chain height.
    assert_eq!(serve(4, 3), vec![4, 5]);
    // Height 0 holds no block.
    assert_eq!(serve(0, 2), vec![1, 2]);
    assert!(serve(6, 3).is_empty());
    assert!(serve(2, 0).is_empty());
}

#[test]
fn bodies_test() {
    let (server, chain) = server();

    match server.serve(&SyncRequest::GetBodies { from: 3, count: 10 }).unwrap() {
        SyncResponse::Bodies(bodies) => {
            assert_eq!(bodies, vec![chain.block(3).body, chain.block(4).body]);
        }
        _ => panic!("expected bodies"),
    }

    match server.serve(&SyncRequest::GetBodies { from: 9, count: 1 }).unwrap() {
        SyncResponse::Bodies(bodies) => assert!(bodies.is_empty()),
        _ => panic!("expected bodies"),
    }
}
