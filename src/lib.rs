/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The replication core of a proof-of-authority blockchain node. It offers:
//! 1. Certified blocks: every block is accepted only with a certificate signed by validators holding at
//!    least two thirds of the trusted validator set's power,
//! 2. Pluggable persistence ([block_store::pluggables]) and peer-to-peer [networking],
//! 3. A [synchronizer] that follows the chain through gossip, debounced fetches, and bulk catch-up,
//! 4. and a [node] that ties them together behind a builder and reports what it does through [events].

pub mod block_store;

pub mod block_sync;

pub mod blockchain;

pub(crate) mod event_bus;

pub mod events;

pub mod genesis;

pub mod lock;

pub mod logging;

pub mod networking;

pub mod node;

pub mod remote_node;

pub mod synchronizer;

pub mod transaction_pool;

pub mod types;
