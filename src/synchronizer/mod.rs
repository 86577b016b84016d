/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The synchronizer, which moves the local chain forward using blocks that peers announce, propagate,
//! or serve on request.
//!
//! ## Ways a block reaches the chain
//!
//! 1. **Propagation**. A peer gossips a `NewBlock`. If it is not too far ahead of the chain height it is
//!    put in the *pending queue*, a min-queue keyed by block height.
//! 2. **Scheduled fetch**. A peer gossips a `NewBlockHeight`. If the block does not arrive on its own
//!    within [`wait_for_fetch`](SynchronizerConfiguration::wait_for_fetch), the synchronizer fetches its
//!    certified header and its body from an idle peer that has it, and puts it in the pending queue.
//! 3. **Catch-up**. When the chain has not moved for
//!    [`catch_up_interval`](SynchronizerConfiguration::catch_up_interval), or when a new peer completes
//!    its handshake, the synchronizer downloads the whole gap between the chain height and the height of
//!    the best peer. See [`catch_up`].
//!
//! ## Chaining
//!
//! The synchronizer thread repeatedly takes the lowest pending block. A block at or below the chain
//! height is discarded. A block more than one above the height is put back and waited on. A block
//! exactly one above the height is validated (structure, link to the current tip, and certificate
//! against the [trusted validator set](TrustPolicy)) and then written in one step, re-checking the
//! height under the block store's lock. An applied block is propagated to peers that do not have it.
//!
//! A block that fails validation is discarded, and the peer that sent it is dropped.
//!
//! ## Threads
//!
//! The pending queue and the fetch schedule are owned by the synchronizer thread. Everything else that
//! wants to talk to it (the node's dispatcher, fetch threads) sends a [`SyncInput`] through its inbox.
//! Fetches and catch-up run on helper threads so that slow peers never stall chaining.

pub(crate) mod catch_up;

pub mod config;

pub mod priority_queue;

pub use config::{SynchronizerConfiguration, TrustPolicy, DEFAULT_TRUST_CONSENSUS_PERIOD};

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crate::block_store::{pluggables::KVStore, BlockStoreError};
use crate::block_sync::client::{SyncClient, SyncClientError};
use crate::blockchain::{Blockchain, BlockchainError};
use crate::events::{Event, InsertBlockEvent, ScheduleFetchEvent, SyncErrorEvent};
use crate::lock::Lock;
use crate::networking::{network::Network, receiving::ResponseRouter, sending::PeerGateway};
use crate::remote_node::RemoteNodeSet;
use crate::types::{
    block::{Block, BlockError, BlockHeader},
    consensus::{Consensus, ConsensusError},
    data_types::{BlockHeight, PeerId, Timestamp},
    validator_set::ValidatorSet,
};

use catch_up::CatchUp;
use priority_queue::PriorityQueue;

// How long the synchronizer thread sleeps on its inbox when it has nothing else to do.
const IDLE_WAIT: Duration = Duration::from_millis(10);

/// Inputs the synchronizer thread accepts from other threads.
pub(crate) enum SyncInput {
    NewBlockHeight { origin: PeerId, height: BlockHeight },
    NewBlock { origin: Option<PeerId>, block: Block, consensus: Consensus },
    NewNode,
    FetchedBlock { origin: PeerId, block: Block, consensus: Consensus },
}

/// Handle for sending [`SyncInput`]s to a running synchronizer.
#[derive(Clone)]
pub(crate) struct SyncHandle {
    to_inbox: Sender<SyncInput>,
}

impl SyncHandle {
    pub(crate) fn send(&self, input: SyncInput) {
        let _ = self.to_inbox.send(input);
    }
}

struct PendingBlock {
    origin: Option<PeerId>,
    block: Block,
    consensus: Consensus,
}

pub struct Synchronizer<K: KVStore, N: Network + 'static> {
    context: SyncContext<K, N>,
    catch_up_lock: Arc<Lock>,
    pending_blocks: PriorityQueue<PendingBlock>,
    // Deadline of each scheduled fetch, keyed by the height to fetch.
    fetch_schedule: HashMap<BlockHeight, Instant>,
    next_catch_up: Instant,
    inbox: Receiver<SyncInput>,
    to_inbox: Sender<SyncInput>,
}

impl<K: KVStore, N: Network + 'static> Synchronizer<K, N> {
    pub fn new(
        configuration: SynchronizerConfiguration,
        blockchain: Arc<Blockchain<K>>,
        remote_nodes: Arc<RemoteNodeSet>,
        network: N,
        propagate_rate_exponent: Option<f64>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let (to_inbox, inbox) = mpsc::channel();
        let router = ResponseRouter::new();
        let next_catch_up = Instant::now() + configuration.catch_up_interval;
        Self {
            context: SyncContext {
                client: SyncClient::new(network.clone(), router, configuration.response_timeout),
                gateway: PeerGateway::new(
                    network,
                    Arc::clone(&remote_nodes),
                    propagate_rate_exponent,
                    event_publisher.clone(),
                ),
                config: configuration,
                blockchain,
                remote_nodes,
                event_publisher,
                stopped: Arc::new(AtomicBool::new(false)),
            },
            catch_up_lock: Arc::new(Lock::new()),
            pending_blocks: PriorityQueue::new(),
            fetch_schedule: HashMap::new(),
            next_catch_up,
            inbox,
            to_inbox,
        }
    }

    /// The router that the node's poller must hand sync responses to.
    pub(crate) fn response_router(&self) -> ResponseRouter {
        self.context.client.router()
    }

    pub(crate) fn handle(&self) -> SyncHandle {
        SyncHandle {
            to_inbox: self.to_inbox.clone(),
        }
    }

    /// Number of blocks waiting in the pending queue.
    pub fn pending_blocks(&self) -> usize {
        self.pending_blocks.len()
    }

    /// Whether a fetch of the block at `height` is scheduled and has not fired yet.
    pub fn is_fetch_scheduled(&self, height: BlockHeight) -> bool {
        self.fetch_schedule.contains_key(&height)
    }

    /// Record that `origin` has the block at `height`, and schedule a fetch of that block if the
    /// announcement raised the peer's known height. Announcements from unregistered peers are ignored.
    pub fn new_block_height(&mut self, origin: PeerId, height: BlockHeight) {
        let node = match self.context.remote_nodes.get(&origin) {
            Some(node) => node,
            None => return,
        };
        if node.raise_height(height) {
            self.schedule_fetch(height);
        }
    }

    /// Accept a propagated block (or, with `origin` set to `None`, a block produced locally) into the
    /// pending queue.
    ///
    /// The sender's known height is raised to the block's height. The block is kept only if it is
    /// above the chain height by at most [`max_pending_gap`](SynchronizerConfiguration::max_pending_gap).
    pub fn new_block(&mut self, origin: Option<PeerId>, block: Block, consensus: Consensus) {
        if let Some(node) = origin.and_then(|origin| self.context.remote_nodes.get(&origin)) {
            node.raise_height(block.height());
        }
        self.enqueue(PendingBlock { origin, block, consensus });
    }

    /// React to a peer completing its handshake by trying to catch up to it straight away.
    pub fn new_node(&mut self) {
        self.catch_up();
    }

    /// Start a catch-up on a helper thread, unless one is already running. Either way, the catch-up
    /// timer starts over.
    pub fn catch_up(&mut self) {
        self.reset_catch_up_timer();
        if self.catch_up_lock.is_locked() {
            return;
        }
        let catch_up = CatchUp::new(self.context.clone(), Arc::clone(&self.catch_up_lock));
        thread::spawn(move || catch_up.run());
    }

    /// Take the lowest pending block and try to apply it. Returns whether the block was consumed, that
    /// is, applied or discarded rather than put back to wait.
    pub fn chain_pending_block(&mut self) -> bool {
        let (height, pending) = match self.pending_blocks.pop() {
            Some(entry) => entry,
            None => return false,
        };

        let known = match self.context.blockchain.height() {
            Ok(known) => known,
            Err(err) => {
                self.pending_blocks.push(height, pending);
                self.context.report(None, err.into());
                return false;
            }
        };
        if height <= known {
            return true;
        }
        if height > known + 1 {
            self.pending_blocks.push(height, pending);
            return false;
        }

        match self.apply(&pending) {
            Ok(true) => {
                Event::InsertBlock(InsertBlockEvent {
                    timestamp: SystemTime::now(),
                    height,
                    hash: pending.block.hash(),
                    origin: pending.origin,
                })
                .publish(&self.context.event_publisher);
                self.context
                    .gateway
                    .propagate_block(&pending.block, &pending.consensus);
                self.reset_catch_up_timer();
            }
            // Another task extended the chain first.
            Ok(false) => (),
            Err(err) => {
                if let Some(origin) = pending.origin {
                    self.context.drop_if_faulty(origin, &err);
                }
                self.context.report(pending.origin, err);
            }
        }
        true
    }

    /// Start the synchronizer thread.
    pub(crate) fn start(mut self, shutdown_signal: Receiver<()>) -> JoinHandle<()> {
        thread::spawn(move || {
            self.reset_catch_up_timer();
            loop {
                match shutdown_signal.try_recv() {
                    Ok(()) => {
                        self.stop();
                        return;
                    }
                    Err(TryRecvError::Empty) => (),
                    Err(TryRecvError::Disconnected) => {
                        panic!("Synchronizer thread disconnected from main thread")
                    }
                }

                let first_input = if self.has_chainable_block() {
                    self.inbox.try_recv().ok()
                } else {
                    match self.inbox.recv_timeout(IDLE_WAIT) {
                        Ok(input) => Some(input),
                        Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
                    }
                };
                if let Some(input) = first_input {
                    self.on_input(input);
                    while let Ok(input) = self.inbox.try_recv() {
                        self.on_input(input);
                    }
                }

                self.fire_due_fetches();

                if Instant::now() >= self.next_catch_up {
                    self.catch_up();
                }

                self.chain_pending_block();
            }
        })
    }

    fn on_input(&mut self, input: SyncInput) {
        match input {
            SyncInput::NewBlockHeight { origin, height } => self.new_block_height(origin, height),
            SyncInput::NewBlock { origin, block, consensus } => self.new_block(origin, block, consensus),
            SyncInput::NewNode => self.new_node(),
            SyncInput::FetchedBlock { origin, block, consensus } => self.enqueue(PendingBlock {
                origin: Some(origin),
                block,
                consensus,
            }),
        }
    }

    fn enqueue(&mut self, pending: PendingBlock) {
        let known = match self.context.blockchain.height() {
            Ok(known) => known,
            Err(err) => return self.context.report(None, err.into()),
        };
        let height = pending.block.height();
        if height <= known || height - known > self.context.config.max_pending_gap {
            return;
        }
        // A copy resent by any peer is queued once. Copies that differ in any byte are all kept.
        let queued = self.pending_blocks.iter().any(|(queued_height, entry)| {
            queued_height == height
                && entry.block == pending.block
                && entry.consensus == pending.consensus
        });
        if !queued {
            self.pending_blocks.push(height, pending);
        }
    }

    fn schedule_fetch(&mut self, height: BlockHeight) {
        if self.fetch_schedule.contains_key(&height) {
            return;
        }
        match self.context.blockchain.height() {
            Ok(known) if height <= known => return,
            Ok(_) => (),
            Err(err) => return self.context.report(None, err.into()),
        }
        self.fetch_schedule
            .insert(height, Instant::now() + self.context.config.wait_for_fetch);
        Event::ScheduleFetch(ScheduleFetchEvent {
            timestamp: SystemTime::now(),
            height,
        })
        .publish(&self.context.event_publisher);
    }

    fn fire_due_fetches(&mut self) {
        let now = Instant::now();
        let due: Vec<BlockHeight> = self
            .fetch_schedule
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(height, _)| *height)
            .collect();

        for height in due {
            self.fetch_schedule.remove(&height);
            let mut context = self.context.clone();
            let to_inbox = self.to_inbox.clone();
            thread::spawn(move || {
                if let Some((origin, block, consensus)) = context.fetch(height) {
                    let _ = to_inbox.send(SyncInput::FetchedBlock {
                        origin,
                        block,
                        consensus,
                    });
                }
            });
        }
    }

    /// Validate `pending` against the current tip and write it. Returns `Ok(false)` if the chain height
    /// moved before the write could happen.
    fn apply(&self, pending: &PendingBlock) -> Result<bool, SyncError> {
        let block = &pending.block;
        let known = block.height() - 1;

        block.validate()?;
        self.context.check_link(&block.header, known)?;
        let validator_set = self.context.trusted_validator_set()?;
        pending.consensus.validate(&block.hash(), &validator_set)?;

        let block_store = self.context.blockchain.block_store();
        block_store.with_lock(|| -> Result<bool, SyncError> {
            if block_store.height()? != known {
                return Ok(false);
            }
            block_store.extend_chain(&block.header, &block.body, &pending.consensus)?;
            Ok(true)
        })
    }

    fn has_chainable_block(&self) -> bool {
        match (self.pending_blocks.peek_priority(), self.context.blockchain.height()) {
            (Some(lowest), Ok(known)) => lowest <= known + 1,
            _ => false,
        }
    }

    fn reset_catch_up_timer(&mut self) {
        self.next_catch_up = Instant::now() + self.context.config.catch_up_interval;
    }

    fn stop(&mut self) {
        self.context.stopped.store(true, Ordering::Release);
        self.fetch_schedule.clear();
        self.pending_blocks.clear();
    }
}

/// The parts of the synchronizer that helper threads (fetches and catch-up) work with. Every helper
/// thread gets its own clone.
pub(crate) struct SyncContext<K: KVStore, N: Network> {
    pub(crate) config: SynchronizerConfiguration,
    pub(crate) blockchain: Arc<Blockchain<K>>,
    pub(crate) remote_nodes: Arc<RemoteNodeSet>,
    pub(crate) client: SyncClient<N>,
    pub(crate) gateway: PeerGateway<N>,
    pub(crate) event_publisher: Option<Sender<Event>>,
    pub(crate) stopped: Arc<AtomicBool>,
}

impl<K: KVStore, N: Network> Clone for SyncContext<K, N> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            blockchain: Arc::clone(&self.blockchain),
            remote_nodes: Arc::clone(&self.remote_nodes),
            client: self.client.clone(),
            gateway: self.gateway.clone(),
            event_publisher: self.event_publisher.clone(),
            stopped: Arc::clone(&self.stopped),
        }
    }
}

impl<K: KVStore, N: Network> SyncContext<K, N> {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// The validator set that certificates received from peers are checked against, according to the
    /// configured [`TrustPolicy`].
    ///
    /// Before any block has been applied, the genesis block's validator set is trusted under either
    /// policy.
    pub(crate) fn trusted_validator_set(&self) -> Result<ValidatorSet, SyncError> {
        match self.config.trust_policy {
            TrustPolicy::Static => Ok(self.blockchain.validator_set_of(1)?),
            TrustPolicy::Dynamic { trust_consensus_period } => {
                let height = self.blockchain.height()?;
                if height == 0 {
                    return Ok(self.blockchain.genesis().body.next_validator_set.clone());
                }
                let last_block_timestamp = self.blockchain.header_of(height)?.timestamp;
                if secs_since_unix_epoch().saturating_sub(last_block_timestamp)
                    >= trust_consensus_period.as_secs()
                {
                    return Err(SyncError::UntrustedValidatorSet {
                        last_block_timestamp,
                    });
                }
                Ok(self.blockchain.body_of(height)?.next_validator_set)
            }
        }
    }

    /// Check that `header` extends the block at height `known`. The block at height 1 must be the
    /// genesis block itself.
    pub(crate) fn check_link(&self, header: &BlockHeader, known: BlockHeight) -> Result<(), SyncError> {
        let linked = if known == 0 {
            header.hash() == self.blockchain.genesis_hash()
        } else {
            header.last_block_hash == self.blockchain.hash_of(known)?
        };
        if linked {
            Ok(())
        } else {
            Err(SyncError::UnlinkedBlock {
                height: header.height,
            })
        }
    }

    /// Fetch the certified block at `height` from some idle peer that has it, trying peers until one
    /// delivers. Gives up if the height is no longer worth fetching, or no suitable peer is left.
    pub(crate) fn fetch(&mut self, height: BlockHeight) -> Option<(PeerId, Block, Consensus)> {
        let known = match self.blockchain.height() {
            Ok(known) => known,
            Err(err) => {
                self.report(None, err.into());
                return None;
            }
        };
        if height <= known || height - known > self.config.max_pending_gap {
            return None;
        }

        while !self.is_stopped() {
            let node = self.remote_nodes.pick_idle_provider(height)?;
            let peer = node.peer();
            let client = &mut self.client;
            let result = node.use_exclusively(|| -> Result<(Block, Consensus), SyncError> {
                let (header, consensus) = client.fetch_consented_header(peer, height)?;
                if header.height != height {
                    return Err(SyncError::UnexpectedHeight {
                        expected: height,
                        received: header.height,
                    });
                }
                let body = client
                    .fetch_bodies(peer, height, 1)?
                    .into_iter()
                    .next()
                    .ok_or(SyncError::ShortResponse {
                        from: height,
                        count: 1,
                        received: 0,
                    })?;
                Ok((Block::new(header, body), consensus))
            });

            match result {
                Ok((block, consensus)) => return Some((peer, block, consensus)),
                Err(err) => {
                    let is_peer_fault = err.is_peer_fault();
                    self.drop_if_faulty(peer, &err);
                    self.report(Some(peer), err);
                    if !is_peer_fault {
                        return None;
                    }
                }
            }
        }
        None
    }

    /// Drop `peer` if `error` is its fault.
    pub(crate) fn drop_if_faulty(&mut self, peer: PeerId, error: &SyncError) {
        if error.is_peer_fault() {
            self.gateway.drop_remote_node(peer, error.to_string());
        }
    }

    /// Publish `error` on the node's error stream.
    pub(crate) fn report(&self, peer: Option<PeerId>, error: SyncError) {
        log::debug!("sync error: {}", error);
        Event::SyncError(SyncErrorEvent {
            timestamp: SystemTime::now(),
            peer,
            error,
        })
        .publish(&self.event_publisher);
    }
}

fn secs_since_unix_epoch() -> Timestamp {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

#[derive(Debug)]
pub enum SyncError {
    /// Reading or writing the local chain failed.
    Blockchain(BlockchainError),
    InvalidBlock(BlockError),
    InvalidConsensus(ConsensusError),
    PeerProtocol(SyncClientError),
    /// A peer answered a request for the header at `expected` with the header at `received`.
    UnexpectedHeight { expected: BlockHeight, received: BlockHeight },
    /// The header at `height` is not the parent of the header above it.
    InvalidHeaderChain { height: BlockHeight },
    /// The block at `height` does not extend the local chain.
    UnlinkedBlock { height: BlockHeight },
    /// The block at the chain height is older than the trust period, so no validator set is trusted.
    UntrustedValidatorSet { last_block_timestamp: Timestamp },
    /// No peer is known to have the block at `height`.
    NoProvider { height: BlockHeight },
    /// A peer answered a range request with fewer items than requested.
    ShortResponse { from: BlockHeight, count: u64, received: usize },
    /// The synchronizer stopped while the task was running.
    Interrupted,
}

impl SyncError {
    /// Whether the peer that caused this error should be dropped.
    pub fn is_peer_fault(&self) -> bool {
        match self {
            SyncError::InvalidBlock(_)
            | SyncError::InvalidConsensus(_)
            | SyncError::UnexpectedHeight { .. }
            | SyncError::InvalidHeaderChain { .. }
            | SyncError::UnlinkedBlock { .. }
            | SyncError::ShortResponse { .. } => true,
            SyncError::PeerProtocol(err) => *err != SyncClientError::Disconnected,
            SyncError::Blockchain(_)
            | SyncError::UntrustedValidatorSet { .. }
            | SyncError::NoProvider { .. }
            | SyncError::Interrupted => false,
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Blockchain(err) => write!(f, "blockchain error: {}", err),
            SyncError::InvalidBlock(err) => write!(f, "invalid block: {}", err),
            SyncError::InvalidConsensus(err) => write!(f, "invalid consensus: {}", err),
            SyncError::PeerProtocol(err) => write!(f, "{}", err),
            SyncError::UnexpectedHeight { expected, received } => {
                write!(f, "expected header at height {}, got {}", expected, received)
            }
            SyncError::InvalidHeaderChain { height } => {
                write!(f, "header at height {} does not link to its successor", height)
            }
            SyncError::UnlinkedBlock { height } => {
                write!(f, "block at height {} does not extend the local chain", height)
            }
            SyncError::UntrustedValidatorSet { last_block_timestamp } => write!(
                f,
                "validator set of the block at timestamp {} is no longer trusted",
                last_block_timestamp
            ),
            SyncError::NoProvider { height } => write!(f, "no peer has the block at height {}", height),
            SyncError::ShortResponse { from, count, received } => write!(
                f,
                "requested {} items from height {}, received {}",
                count, from, received
            ),
            SyncError::Interrupted => write!(f, "synchronizer stopped"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Blockchain(err) => Some(err),
            SyncError::InvalidBlock(err) => Some(err),
            SyncError::InvalidConsensus(err) => Some(err),
            SyncError::PeerProtocol(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BlockchainError> for SyncError {
    fn from(value: BlockchainError) -> Self {
        SyncError::Blockchain(value)
    }
}

impl From<BlockStoreError> for SyncError {
    fn from(value: BlockStoreError) -> Self {
        SyncError::Blockchain(BlockchainError::BlockStoreError(value))
    }
}

impl From<BlockError> for SyncError {
    fn from(value: BlockError) -> Self {
        SyncError::InvalidBlock(value)
    }
}

impl From<ConsensusError> for SyncError {
    fn from(value: ConsensusError) -> Self {
        SyncError::InvalidConsensus(value)
    }
}

impl From<SyncClientError> for SyncError {
    fn from(value: SyncClientError) -> Self {
        SyncError::PeerProtocol(value)
    }
}
