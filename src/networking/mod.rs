/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The node's interface to the P2P network: the [`Network`](network::Network) trait that transports
//! implement, the wire [messages](messages), and the threads and handles that move messages between the
//! transport and the rest of the node.

pub mod messages;

pub mod network;

pub(crate) mod receiving;

pub(crate) mod sending;
