/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use crate::types::data_types::PeerId;

use super::messages::Message;

/// The P2P transport a node runs on top of.
///
/// Connection establishment, peer discovery, and encryption are the provider's concern. The provider
/// tells the node about every newly connected peer through [`Node::handshake`](crate::node::Node::handshake).
pub trait Network: Clone + Send {
    /// Send a message to the specified peer without blocking.
    fn send(&mut self, peer: PeerId, message: Message);

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(PeerId, Message)>;

    /// Disconnect from `peer`. The node has stopped trusting it and will ignore its gossip until it
    /// sends a new `Hello`.
    fn drop_peer(&mut self, peer: PeerId);
}
