/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for sending messages to the P2P network.

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::events::{DropPeerEvent, Event};
use crate::logging::first_seven_base64_chars;
use crate::remote_node::RemoteNodeSet;
use crate::types::{
    block::Block,
    consensus::Consensus,
    data_types::PeerId,
    transaction::Transaction,
};

use super::{
    messages::{GossipMessage, Message},
    network::Network,
};

/// Handle for sending messages to the [`Network`].
///
/// It can be used to send instances of any type that implement the [`Into<Message>`] trait.
#[derive(Clone)]
pub(crate) struct SenderHandle<N: Network> {
    network: N,
}

impl<N: Network> SenderHandle<N> {
    pub(crate) fn new(network: N) -> Self {
        Self { network }
    }

    pub(crate) fn send<S: Into<Message>>(&mut self, peer: PeerId, msg: S) {
        self.network.send(peer, msg.into())
    }

    pub(crate) fn drop_peer(&mut self, peer: PeerId) {
        self.network.drop_peer(peer)
    }
}

/// Outbound side of the node's relationship with its peers: gossip fan-out and dropping peers.
///
/// Cheap to clone. Every thread that needs to propagate or drop holds its own clone.
#[derive(Clone)]
pub(crate) struct PeerGateway<N: Network> {
    sender: SenderHandle<N>,
    remote_nodes: Arc<RemoteNodeSet>,
    propagate_rate_exponent: Option<f64>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network> PeerGateway<N> {
    pub(crate) fn new(
        network: N,
        remote_nodes: Arc<RemoteNodeSet>,
        propagate_rate_exponent: Option<f64>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            sender: SenderHandle::new(network),
            remote_nodes,
            propagate_rate_exponent,
            event_publisher,
        }
    }

    pub(crate) fn send<S: Into<Message>>(&mut self, peer: PeerId, msg: S) {
        self.sender.send(peer, msg)
    }

    /// Send the full block to a sample of the peers that do not have it yet, and announce its height to
    /// all of them.
    pub(crate) fn propagate_block(&mut self, block: &Block, consensus: &Consensus) {
        let height = block.height();
        for node in self
            .remote_nodes
            .pick_block_receivers(height, self.propagate_rate_exponent)
        {
            self.sender.send(
                node.peer(),
                GossipMessage::NewBlock {
                    block: block.clone(),
                    consensus: consensus.clone(),
                },
            );
        }
        for node in self.remote_nodes.pick_block_receivers(height, None) {
            self.sender
                .send(node.peer(), GossipMessage::NewBlockHeight { height });
        }
    }

    pub(crate) fn propagate_transaction(&mut self, transaction: &Transaction) {
        for node in self
            .remote_nodes
            .pick_transaction_receivers(self.propagate_rate_exponent)
        {
            self.sender
                .send(node.peer(), GossipMessage::NewTransaction(transaction.clone()));
        }
    }

    /// Forget `peer` and disconnect from it.
    pub(crate) fn drop_remote_node(&mut self, peer: PeerId, reason: String) {
        self.remote_nodes.remove(&peer);
        self.sender.drop_peer(peer);
        log::debug!(
            "dropped peer {}: {}",
            first_seven_base64_chars(peer.as_bytes()),
            reason
        );
        Event::DropPeer(DropPeerEvent {
            timestamp: SystemTime::now(),
            peer,
            reason,
        })
        .publish(&self.event_publisher);
    }
}
