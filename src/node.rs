/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a node.
//!
//! A node keeps a local copy of the chain in sync with its peers. It does not produce blocks or
//! certificates itself: a validator running next to the node hands the blocks it produced to
//! [`Node::submit_local_block`], and everything else arrives from peers.
//!
//! ## Starting a node
//!
//! ```ignore
//! let node =
//!     NodeSpec::builder()
//!     .kv_store(kv_store)
//!     .network(network)
//!     .genesis(genesis)
//!     .configuration(configuration)
//!     .on_insert_block(insert_block_handler)
//!     .build()
//!     .start()?;
//! ```
//!
//! ### Required setters
//!
//! - `.kv_store(...)`
//! - `.network(...)`
//! - `.genesis(...)`
//!
//! ### Optional setters
//!
//! - `.configuration(...)`
//! - `.validate_transaction(...)`
//! - `.on_new_transaction(...)`
//! - `.on_insert_block(...)`
//! - `.on_receive_new_block(...)`
//! - `.on_complete_handshake(...)`
//! - `.on_schedule_fetch(...)`
//! - `.on_start_catch_up(...)`
//! - `.on_end_catch_up(...)`
//! - `.on_receive_sync_request(...)`
//! - `.on_drop_peer(...)`
//! - `.on_sync_error(...)`
//!
//! ## Handshake
//!
//! The networking provider must call [`Node::handshake`] for every peer it connects to, whichever side
//! opened the connection. Both sides then send each other a `Hello` carrying their chain height and
//! genesis hash. A peer whose `Hello` carries our genesis hash is registered; any other peer is dropped.
//! So is a peer that does not complete the handshake within
//! [`handshake_timeout`](Configuration::handshake_timeout).
//!
//! Gossip from peers that have not completed the handshake is ignored. Sync requests are served to
//! anyone.
//!
//! ## Transactions
//!
//! Transactions gossiped by peers and those passed to [`Node::submit_transaction`] go through the
//! node's [transaction pool](TransactionPool). A transaction is gossiped onwards, and handed to the
//! `on_new_transaction` handler if it came from a peer, only when it first enters the pool.
//!
//! ## Threads
//!
//! A running node consists of the poller, the sync server, the dispatcher (which handles gossip and
//! handshakes), the [synchronizer](crate::synchronizer), and, if any event handler is registered, the
//! [event bus](crate::event_bus). Dropping the [`Node`] shuts all of them down.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use typed_builder::TypedBuilder;

use crate::block_store::{pluggables::KVStore, BlockStore};
use crate::block_sync::{messages::SyncResponse, server::SyncServer};
use crate::blockchain::{Blockchain, BlockchainError};
use crate::event_bus::*;
use crate::events::*;
use crate::genesis::GenesisConfiguration;
use crate::logging::first_seven_base64_chars;
use crate::networking::{
    messages::{GossipMessage, Message},
    network::Network,
    receiving::start_polling,
    sending::PeerGateway,
};
use crate::remote_node::RemoteNodeSet;
use crate::synchronizer::{SyncHandle, SyncInput, Synchronizer, SynchronizerConfiguration};
use crate::transaction_pool::{
    TransactionPool, TransactionPoolError, TransactionValidator, DEFAULT_MAX_POOLED_TRANSACTIONS,
};
use crate::types::{
    block::Block,
    consensus::Consensus,
    data_types::{BlockHeight, CryptoHash, PeerId},
    transaction::Transaction,
};

#[derive(Clone, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. Every field has a default, so only the fields to
    override need to be set.
"))]
pub struct Configuration {
    #[builder(default, setter(doc = "Set the [synchronizer's configuration](SynchronizerConfiguration)."))]
    pub synchronizer: SynchronizerConfiguration,
    #[builder(default = Some(0.5), setter(doc = "Set the exponent `r` such that full blocks and transactions are gossiped to `⌊n ^ r⌋` of `n` candidate peers. `None` or zero gossips to all of them."))]
    pub propagate_rate_exponent: Option<f64>,
    #[builder(default = DEFAULT_MAX_POOLED_TRANSACTIONS, setter(doc = "Set the maximum number of transactions held in the transaction pool."))]
    pub max_pooled_transactions: usize,
    #[builder(default = Duration::from_millis(100), setter(doc = "Set how long a peer has to complete the handshake."))]
    pub handshake_timeout: Duration,
    #[builder(default = 1000, setter(doc = "Set the maximum number of headers sent in one response."))]
    pub max_serve_headers: u32,
    #[builder(default = 100, setter(doc = "Set the maximum number of bodies sent in one response."))]
    pub max_serve_bodies: u32,
    #[builder(default = false, setter(doc = "Enable logging of events."))]
    pub log_events: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [NodeSpec]. On the builder call the following methods to construct a valid [NodeSpec].

    Required:
    - `.kv_store(...)`
    - `.network(...)`
    - `.genesis(...)`

    Optional:
    - `.configuration(...)`
    - `.validate_transaction(...)`
    - `.on_new_transaction(...)`
    - `.on_insert_block(...)`
    - `.on_receive_new_block(...)`
    - `.on_complete_handshake(...)`
    - `.on_schedule_fetch(...)`
    - `.on_start_catch_up(...)`
    - `.on_end_catch_up(...)`
    - `.on_receive_sync_request(...)`
    - `.on_drop_peer(...)`
    - `.on_sync_error(...)`
"))]
pub struct NodeSpec<K: KVStore, N: Network + 'static> {
    #[builder(setter(doc = "Set the implementation of the node's Key-Value store. The argument must implement the [KVStore] trait. Required."))]
    kv_store: K,
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network] trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the [genesis configuration](GenesisConfiguration) of the chain the node follows. Required."))]
    genesis: GenesisConfiguration,
    #[builder(default, setter(doc = "Set the node's [configuration](Configuration). Optional."))]
    configuration: Configuration,
    #[builder(default, setter(transform = |validator: impl Fn(&Transaction) -> bool + Send + Sync + 'static| Some(Box::new(validator) as TransactionValidator),
    doc = "Set the closure that decides whether a transaction may enter the transaction pool. Without it every transaction is accepted. Optional."))]
    validate_transaction: Option<TransactionValidator>,
    #[builder(default, setter(transform = |handler: impl Fn(&Transaction) + Send + 'static| Some(Box::new(handler) as HandlerPtr<Transaction>),
    doc = "Register a handler closure to be invoked with every transaction a peer gossips that enters the transaction pool. Optional."))]
    on_new_transaction: Option<HandlerPtr<Transaction>>,
    #[builder(default, setter(transform = |handler: impl Fn(&InsertBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<InsertBlockEvent>),
    doc = "Register a handler closure to be invoked after a block is applied on top of the chain. Optional."))]
    on_insert_block: Option<HandlerPtr<InsertBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveNewBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveNewBlockEvent>),
    doc = "Register a handler closure to be invoked after a peer gossips a block. Optional."))]
    on_receive_new_block: Option<HandlerPtr<ReceiveNewBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CompleteHandshakeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CompleteHandshakeEvent>),
    doc = "Register a handler closure to be invoked after a peer completes the handshake. Optional."))]
    on_complete_handshake: Option<HandlerPtr<CompleteHandshakeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ScheduleFetchEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ScheduleFetchEvent>),
    doc = "Register a handler closure to be invoked after a fetch of an announced block is scheduled. Optional."))]
    on_schedule_fetch: Option<HandlerPtr<ScheduleFetchEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartCatchUpEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartCatchUpEvent>),
    doc = "Register a handler closure to be invoked after the node starts catching up to a peer. Optional."))]
    on_start_catch_up: Option<HandlerPtr<StartCatchUpEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EndCatchUpEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EndCatchUpEvent>),
    doc = "Register a handler closure to be invoked after the node finishes catching up to a peer. Optional."))]
    on_end_catch_up: Option<HandlerPtr<EndCatchUpEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveSyncRequestEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveSyncRequestEvent>),
    doc = "Register a handler closure to be invoked after the node receives a sync request from a peer. Optional."))]
    on_receive_sync_request: Option<HandlerPtr<ReceiveSyncRequestEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&DropPeerEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<DropPeerEvent>),
    doc = "Register a handler closure to be invoked after the node drops a peer. Optional."))]
    on_drop_peer: Option<HandlerPtr<DropPeerEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SyncErrorEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SyncErrorEvent>),
    doc = "Register a handler closure to be invoked with every error the synchronizer recovers from. Optional."))]
    on_sync_error: Option<HandlerPtr<SyncErrorEvent>>,
}

impl<K: KVStore, N: Network + 'static> NodeSpec<K, N> {
    /// Make the chain ready and start the node's threads.
    ///
    /// Fails if the store holds a different chain than the configured genesis block starts.
    pub fn start(self) -> Result<Node<K>, BlockchainError> {
        let blockchain = Arc::new(Blockchain::new(
            Arc::new(BlockStore::new(self.kv_store)),
            &self.genesis,
        ));
        blockchain.ready()?;

        let configuration = self.configuration;

        let mut event_handlers = EventHandlers::default();
        if configuration.log_events {
            event_handlers.add_loggers();
        }
        event_handlers.insert_block_handlers.extend(self.on_insert_block);
        event_handlers.receive_new_block_handlers.extend(self.on_receive_new_block);
        event_handlers.complete_handshake_handlers.extend(self.on_complete_handshake);
        event_handlers.schedule_fetch_handlers.extend(self.on_schedule_fetch);
        event_handlers.start_catch_up_handlers.extend(self.on_start_catch_up);
        event_handlers.end_catch_up_handlers.extend(self.on_end_catch_up);
        event_handlers.receive_sync_request_handlers.extend(self.on_receive_sync_request);
        event_handlers.drop_peer_handlers.extend(self.on_drop_peer);
        event_handlers.sync_error_handlers.extend(self.on_sync_error);

        let (event_publisher, event_bus, event_bus_shutdown) = if event_handlers.is_empty() {
            (None, None, None)
        } else {
            let (event_publisher, event_subscriber) = mpsc::channel();
            let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
            let event_bus = start_event_bus(event_handlers, event_subscriber, event_bus_shutdown_receiver);
            (Some(event_publisher), Some(event_bus), Some(event_bus_shutdown))
        };

        let remote_nodes = Arc::new(RemoteNodeSet::new());
        let transaction_pool = Arc::new(TransactionPool::new(
            configuration.max_pooled_transactions,
            self.validate_transaction,
        ));

        let synchronizer = Synchronizer::new(
            configuration.synchronizer.clone(),
            Arc::clone(&blockchain),
            Arc::clone(&remote_nodes),
            self.network.clone(),
            configuration.propagate_rate_exponent,
            event_publisher.clone(),
        );
        let sync_handle = synchronizer.handle();

        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let (poller, gossip, sync_requests, unsolicited_responses) = start_polling(
            self.network.clone(),
            synchronizer.response_router(),
            poller_shutdown_receiver,
        );

        let (sync_server_shutdown, sync_server_shutdown_receiver) = mpsc::channel();
        let sync_server = SyncServer::new(
            Arc::clone(&blockchain),
            configuration.max_serve_headers,
            configuration.max_serve_bodies,
        )
        .start(
            self.network.clone(),
            sync_requests,
            event_publisher.clone(),
            sync_server_shutdown_receiver,
        );

        let (synchronizer_shutdown, synchronizer_shutdown_receiver) = mpsc::channel();
        let synchronizer = synchronizer.start(synchronizer_shutdown_receiver);

        let (to_dispatcher, commands) = mpsc::channel();
        let (dispatcher_shutdown, dispatcher_shutdown_receiver) = mpsc::channel();
        let dispatcher = Dispatcher {
            blockchain: Arc::clone(&blockchain),
            remote_nodes: Arc::clone(&remote_nodes),
            transaction_pool: Arc::clone(&transaction_pool),
            gateway: PeerGateway::new(
                self.network,
                Arc::clone(&remote_nodes),
                configuration.propagate_rate_exponent,
                event_publisher.clone(),
            ),
            sync: sync_handle.clone(),
            gossip,
            unsolicited_responses,
            commands,
            pending_handshakes: HashMap::new(),
            handshake_timeout: configuration.handshake_timeout,
            on_new_transaction: self.on_new_transaction,
            event_publisher,
        }
        .start(dispatcher_shutdown_receiver);

        Ok(Node {
            blockchain,
            remote_nodes,
            transaction_pool,
            to_dispatcher,
            sync: sync_handle,
            poller: Some(poller),
            poller_shutdown,
            sync_server: Some(sync_server),
            sync_server_shutdown,
            synchronizer: Some(synchronizer),
            synchronizer_shutdown,
            dispatcher: Some(dispatcher),
            dispatcher_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// A handle to the background threads of a node. When this value is dropped, all background threads
/// are shut down.
pub struct Node<K: KVStore> {
    blockchain: Arc<Blockchain<K>>,
    remote_nodes: Arc<RemoteNodeSet>,
    transaction_pool: Arc<TransactionPool>,
    to_dispatcher: Sender<Command>,
    sync: SyncHandle,
    poller: Option<JoinHandle<()>>,
    poller_shutdown: Sender<()>,
    sync_server: Option<JoinHandle<()>>,
    sync_server_shutdown: Sender<()>,
    synchronizer: Option<JoinHandle<()>>,
    synchronizer_shutdown: Sender<()>,
    dispatcher: Option<JoinHandle<()>>,
    dispatcher_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl<K: KVStore> Node<K> {
    pub fn blockchain(&self) -> &Arc<Blockchain<K>> {
        &self.blockchain
    }

    pub fn remote_nodes(&self) -> &Arc<RemoteNodeSet> {
        &self.remote_nodes
    }

    pub fn transaction_pool(&self) -> &Arc<TransactionPool> {
        &self.transaction_pool
    }

    /// Start the handshake with a newly connected `peer`.
    pub fn handshake(&self, peer: PeerId) {
        let _ = self.to_dispatcher.send(Command::Handshake(peer));
    }

    /// Hand a block produced next to this node to the synchronizer. It is validated and applied like a
    /// block received from a peer, and then propagated.
    pub fn submit_local_block(&self, block: Block, consensus: Consensus) {
        self.sync.send(SyncInput::NewBlock {
            origin: None,
            block,
            consensus,
        });
    }

    /// Put `transaction` in the transaction pool and, if it was not there yet, gossip it to a sample of
    /// the registered peers.
    pub fn submit_transaction(&self, transaction: Transaction) -> Result<(), TransactionPoolError> {
        self.transaction_pool.add(transaction.clone())?;
        let _ = self
            .to_dispatcher
            .send(Command::PropagateTransaction(transaction));
        Ok(())
    }
}

impl<K: KVStore> Drop for Node<K> {
    fn drop(&mut self) {
        // The dispatcher, synchronizer, and sync server receive messages from the poller, so the poller
        // is shut down last.
        shutdown(&mut self.event_bus, self.event_bus_shutdown.as_ref());
        shutdown(&mut self.dispatcher, Some(&self.dispatcher_shutdown));
        shutdown(&mut self.synchronizer, Some(&self.synchronizer_shutdown));
        shutdown(&mut self.sync_server, Some(&self.sync_server_shutdown));
        shutdown(&mut self.poller, Some(&self.poller_shutdown));
    }
}

fn shutdown(thread: &mut Option<JoinHandle<()>>, shutdown_signal: Option<&Sender<()>>) {
    if let Some(shutdown_signal) = shutdown_signal {
        let _ = shutdown_signal.send(());
    }
    if let Some(thread) = thread.take() {
        let _ = thread.join();
    }
}

/// Requests from the [`Node`] handle to the dispatcher thread.
enum Command {
    Handshake(PeerId),
    PropagateTransaction(Transaction),
}

/// Handles gossip, handshakes, and unsolicited sync responses.
struct Dispatcher<K: KVStore, N: Network> {
    blockchain: Arc<Blockchain<K>>,
    remote_nodes: Arc<RemoteNodeSet>,
    transaction_pool: Arc<TransactionPool>,
    gateway: PeerGateway<N>,
    sync: SyncHandle,
    gossip: Receiver<(PeerId, GossipMessage)>,
    unsolicited_responses: Receiver<(PeerId, SyncResponse)>,
    commands: Receiver<Command>,
    // Deadline by which each peer we sent a `Hello` to must answer with its own.
    pending_handshakes: HashMap<PeerId, Instant>,
    handshake_timeout: Duration,
    on_new_transaction: Option<HandlerPtr<Transaction>>,
    event_publisher: Option<Sender<Event>>,
}

impl<K: KVStore, N: Network + 'static> Dispatcher<K, N> {
    fn start(mut self, shutdown_signal: Receiver<()>) -> JoinHandle<()> {
        thread::spawn(move || loop {
            match shutdown_signal.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    panic!("Dispatcher thread disconnected from main thread")
                }
            }

            match self.gossip.recv_timeout(Duration::from_millis(10)) {
                Ok((origin, message)) => self.on_receive_gossip(origin, message),
                Err(RecvTimeoutError::Timeout) => (),
                Err(RecvTimeoutError::Disconnected) => thread::sleep(Duration::from_millis(10)),
            }

            while let Ok(command) = self.commands.try_recv() {
                self.on_command(command);
            }

            while let Ok((origin, _)) = self.unsolicited_responses.try_recv() {
                self.gateway
                    .drop_remote_node(origin, String::from("sent an unsolicited sync response"));
            }

            self.expire_handshakes();
        })
    }

    fn on_receive_gossip(&mut self, origin: PeerId, message: GossipMessage) {
        if let GossipMessage::Hello { height, genesis_hash } = message {
            return self.on_receive_hello(origin, height, genesis_hash);
        }
        if !self.remote_nodes.contains(&origin) {
            return;
        }

        match message {
            GossipMessage::NewBlock { block, consensus } => {
                Event::ReceiveNewBlock(ReceiveNewBlockEvent {
                    timestamp: SystemTime::now(),
                    origin,
                    height: block.height(),
                    hash: block.hash(),
                })
                .publish(&self.event_publisher);
                self.sync.send(SyncInput::NewBlock {
                    origin: Some(origin),
                    block,
                    consensus,
                });
            }
            GossipMessage::NewBlockHeight { height } => {
                self.sync.send(SyncInput::NewBlockHeight { origin, height })
            }
            GossipMessage::NewTransaction(transaction) => {
                self.on_receive_transaction(origin, transaction)
            }
            GossipMessage::Hello { .. } => (),
        }
    }

    fn on_receive_hello(&mut self, origin: PeerId, height: BlockHeight, genesis_hash: CryptoHash) {
        self.pending_handshakes.remove(&origin);
        if genesis_hash != self.blockchain.genesis_hash() {
            self.gateway
                .drop_remote_node(origin, String::from("follows a different genesis block"));
            return;
        }

        self.remote_nodes.add(origin, height);
        Event::CompleteHandshake(CompleteHandshakeEvent {
            timestamp: SystemTime::now(),
            peer: origin,
            height,
        })
        .publish(&self.event_publisher);
        self.sync.send(SyncInput::NewNode);
    }

    fn on_receive_transaction(&mut self, origin: PeerId, transaction: Transaction) {
        if let Err(err) = self.transaction_pool.add(transaction.clone()) {
            log::trace!(
                "not pooling transaction from {}: {}",
                first_seven_base64_chars(origin.as_bytes()),
                err
            );
            return;
        }
        if let Some(on_new_transaction) = &self.on_new_transaction {
            on_new_transaction(&transaction)
        }
        self.gateway.propagate_transaction(&transaction);
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Handshake(peer) => {
                let height = match self.blockchain.height() {
                    Ok(height) => height,
                    Err(err) => {
                        log::error!("cannot read the chain height: {}", err);
                        return;
                    }
                };
                self.gateway
                    .send(peer, Message::hello(height, self.blockchain.genesis_hash()));
                self.pending_handshakes
                    .insert(peer, Instant::now() + self.handshake_timeout);
            }
            Command::PropagateTransaction(transaction) => {
                self.gateway.propagate_transaction(&transaction)
            }
        }
    }

    fn expire_handshakes(&mut self) {
        let now = Instant::now();
        let expired: Vec<PeerId> = self
            .pending_handshakes
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(peer, _)| *peer)
            .collect();
        for peer in expired {
            self.pending_handshakes.remove(&peer);
            if !self.remote_nodes.contains(&peer) {
                self.gateway
                    .drop_remote_node(peer, String::from("did not complete the handshake in time"));
            }
        }
    }
}
