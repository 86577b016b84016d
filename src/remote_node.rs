/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Peers that completed the handshake, and the policies used to choose among them.
//!
//! A [`RemoteNode`] records the highest chain height its peer is known to have, and carries a
//! [`Lock`] that serializes requests to that peer: at most one request is outstanding per peer, and a
//! peer is *idle* while no task holds its lock.
//!
//! [`RemoteNodeSet`] owns every `RemoteNode`. Other components look peers up by [`PeerId`] and hold
//! the returned `Arc` only for the duration of a single task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;

use crate::lock::Lock;
use crate::types::data_types::{BlockHeight, PeerId};

pub struct RemoteNode {
    peer: PeerId,
    height: AtomicU64,
    // Order in which the node was added to its set. Breaks ties in `best_node`.
    seq: u64,
    lock: Lock,
}

impl RemoteNode {
    fn new(peer: PeerId, height: BlockHeight, seq: u64) -> Self {
        Self {
            peer,
            height: AtomicU64::new(height),
            seq,
            lock: Lock::new(),
        }
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// The highest chain height this peer is known to have.
    pub fn height(&self) -> BlockHeight {
        self.height.load(Ordering::Acquire)
    }

    pub fn set_height(&self, height: BlockHeight) {
        self.height.store(height, Ordering::Release)
    }

    /// Raise the recorded height to `height`. Returns whether it was raised.
    pub fn raise_height(&self, height: BlockHeight) -> bool {
        self.height.fetch_max(height, Ordering::AcqRel) < height
    }

    pub fn is_idle(&self) -> bool {
        !self.lock.is_locked()
    }

    /// Run `task` with exclusive use of this peer, waiting for any task already using it to finish.
    pub fn use_exclusively<T>(&self, task: impl FnOnce() -> T) -> T {
        self.lock.use_exclusively(task)
    }
}

#[derive(Default)]
pub struct RemoteNodeSet {
    nodes: Mutex<HashMap<PeerId, Arc<RemoteNode>>>,
    next_seq: AtomicU64,
}

impl RemoteNodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer` at `height`, replacing any node already registered for it.
    pub fn add(&self, peer: PeerId, height: BlockHeight) -> Arc<RemoteNode> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let node = Arc::new(RemoteNode::new(peer, height, seq));
        self.nodes().insert(peer, Arc::clone(&node));
        node
    }

    pub fn get(&self, peer: &PeerId) -> Option<Arc<RemoteNode>> {
        self.nodes().get(peer).cloned()
    }

    pub fn remove(&self, peer: &PeerId) -> Option<Arc<RemoteNode>> {
        self.nodes().remove(peer)
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.nodes().contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.nodes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes().is_empty()
    }

    /// Every registered node, in the order they were added.
    pub fn all(&self) -> Vec<Arc<RemoteNode>> {
        let mut nodes: Vec<_> = self.nodes().values().cloned().collect();
        nodes.sort_by_key(|node| node.seq);
        nodes
    }

    /// The node with the greatest known height. Among nodes of equal height, the one added first wins.
    pub fn best_node(&self) -> Option<Arc<RemoteNode>> {
        self.all()
            .into_iter()
            .fold(None, |best: Option<Arc<RemoteNode>>, node| match best {
                Some(best) if best.height() >= node.height() => Some(best),
                _ => Some(node),
            })
    }

    /// A uniformly random node whose known height is at least `min_height`.
    pub fn pick_provider(&self, min_height: BlockHeight) -> Option<Arc<RemoteNode>> {
        self.pick_one(|node| node.height() >= min_height)
    }

    /// A uniformly random idle node whose known height is at least `min_height`.
    pub fn pick_idle_provider(&self, min_height: BlockHeight) -> Option<Arc<RemoteNode>> {
        self.pick_one(|node| node.height() >= min_height && node.is_idle())
    }

    /// Nodes to gossip a transaction to: `⌊n ^ rate_exponent⌋` of all `n` nodes, or all of them if
    /// `rate_exponent` is `None` or zero.
    pub fn pick_transaction_receivers(&self, rate_exponent: Option<f64>) -> Vec<Arc<RemoteNode>> {
        pick_sample(self.all(), rate_exponent)
    }

    /// Nodes to propagate the block at `height` to, sized like
    /// [`pick_transaction_receivers`](Self::pick_transaction_receivers) but drawn only from nodes whose
    /// known height is below `height`.
    pub fn pick_block_receivers(
        &self,
        height: BlockHeight,
        rate_exponent: Option<f64>,
    ) -> Vec<Arc<RemoteNode>> {
        let candidates = self
            .all()
            .into_iter()
            .filter(|node| node.height() < height)
            .collect();
        pick_sample(candidates, rate_exponent)
    }

    fn pick_one(&self, predicate: impl Fn(&RemoteNode) -> bool) -> Option<Arc<RemoteNode>> {
        let candidates: Vec<_> = self.all().into_iter().filter(|node| predicate(node)).collect();
        partial_shuffle(candidates, 1).pop()
    }

    fn nodes(&self) -> MutexGuard<'_, HashMap<PeerId, Arc<RemoteNode>>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn pick_sample(candidates: Vec<Arc<RemoteNode>>, rate_exponent: Option<f64>) -> Vec<Arc<RemoteNode>> {
    let count = match rate_exponent {
        Some(rate) if rate != 0.0 => (candidates.len() as f64).powf(rate).floor() as usize,
        _ => candidates.len(),
    };
    partial_shuffle(candidates, count)
}

/// Fisher–Yates shuffle stopped after the first `count` slots. Returns those slots: a uniformly random
/// subset of `items` of size `min(count, items.len())`.
fn partial_shuffle<T>(mut items: Vec<T>, count: usize) -> Vec<T> {
    let count = count.min(items.len());
    let mut rng = rand::thread_rng();
    for i in 0..count {
        let j = rng.gen_range(i, items.len());
        items.swap(i, j);
    }
    items.truncate(count);
    items
}
