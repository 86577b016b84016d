/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Downloading the gap between the local chain height and the height of the best peer.
//!
//! A catch-up with the best peer (the peer with the greatest known height) goes through four steps:
//! 1. **Last consented header**. Fetch the header at the best peer's height together with its
//!    certificate, and check the certificate against the trusted validator set. This is the only
//!    certificate checked: every other header is trusted because it hashes into this one.
//! 2. **Headers**. Walk down from the last consented header in batches of at most
//!    [`max_fetch_headers`](super::SynchronizerConfiguration::max_fetch_headers), checking that each
//!    header is the parent of the one above it, until the chain height is reached. The lowest header must
//!    extend the local tip.
//! 3. **Bodies**. Split the range into jobs of at most
//!    [`max_fetch_bodies`](super::SynchronizerConfiguration::max_fetch_bodies) bodies and fetch them in
//!    parallel from idle peers, lowest job first. Each body is checked against its stored header. A job
//!    that fails is retried with another peer.
//! 4. **Height**. Move the chain height to the best peer's height, unless the chain already moved past it.
//!
//! Steps 1 and 2 are made with exclusive use of the best peer. At most one catch-up runs at a time.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use crate::block_store::pluggables::KVStore;
use crate::events::{EndCatchUpEvent, Event, StartCatchUpEvent};
use crate::lock::Lock;
use crate::networking::network::Network;
use crate::remote_node::RemoteNode;
use crate::types::{
    block::BlockHeader,
    consensus::Consensus,
    data_types::{BlockHeight, PeerId},
};

use super::priority_queue::PriorityQueue;
use super::{SyncContext, SyncError};

// How long the body step waits for a job to finish before looking for idle peers again.
const JOB_WAIT: Duration = Duration::from_millis(10);

/// An inclusive range of heights whose bodies are fetched in one request.
#[derive(Clone, Copy, Debug)]
struct BodyJob {
    from: BlockHeight,
    to: BlockHeight,
}

pub(crate) struct CatchUp<K: KVStore, N: Network> {
    context: SyncContext<K, N>,
    lock: Arc<Lock>,
}

impl<K: KVStore, N: Network> CatchUp<K, N> {
    pub(crate) fn new(context: SyncContext<K, N>, lock: Arc<Lock>) -> Self {
        Self { context, lock }
    }

    /// Catch up, unless another catch-up holds the lock.
    pub(crate) fn run(mut self) {
        let lock = Arc::clone(&self.lock);
        lock.try_use(|| self.catch_up());
    }

    fn catch_up(&mut self) {
        let best = match self.context.remote_nodes.best_node() {
            Some(best) => best,
            None => return,
        };
        let known = match self.context.blockchain.height() {
            Ok(known) => known,
            Err(err) => return self.context.report(None, err.into()),
        };
        let target = best.height();
        if target <= known {
            return;
        }

        let peer = best.peer();
        Event::StartCatchUp(StartCatchUpEvent {
            timestamp: SystemTime::now(),
            peer,
            target_height: target,
        })
        .publish(&self.context.event_publisher);

        match self.catch_up_to(&best, known, target) {
            Ok(height) => Event::EndCatchUp(EndCatchUpEvent {
                timestamp: SystemTime::now(),
                peer,
                height,
            })
            .publish(&self.context.event_publisher),
            Err(SyncError::Interrupted) => (),
            Err(err) => {
                let culprit = if err.is_peer_fault() { Some(peer) } else { None };
                self.context.report(culprit, err)
            }
        }
    }

    fn catch_up_to(
        &mut self,
        best: &RemoteNode,
        known: BlockHeight,
        target: BlockHeight,
    ) -> Result<BlockHeight, SyncError> {
        let (last_header, last_consensus) = self.fetch_last_consented_header(best, target)?;
        self.catch_up_headers(best, last_header, known)?;
        self.catch_up_bodies(target)?;
        self.update_height(target, &last_consensus)?;
        Ok(self.context.blockchain.height()?)
    }

    fn fetch_last_consented_header(
        &mut self,
        best: &RemoteNode,
        target: BlockHeight,
    ) -> Result<(BlockHeader, Consensus), SyncError> {
        let peer = best.peer();
        let context = &mut self.context;
        let result = best.use_exclusively(|| -> Result<(BlockHeader, Consensus), SyncError> {
            let (header, consensus) = context.client.fetch_consented_header(peer, target)?;
            if header.height != target {
                return Err(SyncError::UnexpectedHeight {
                    expected: target,
                    received: header.height,
                });
            }
            let validator_set = context.trusted_validator_set()?;
            consensus.validate(&header.hash(), &validator_set)?;
            Ok((header, consensus))
        });

        if let Err(err) = &result {
            self.context.drop_if_faulty(peer, err);
        }
        result
    }

    fn catch_up_headers(
        &mut self,
        best: &RemoteNode,
        last_header: BlockHeader,
        known: BlockHeight,
    ) -> Result<(), SyncError> {
        let peer = best.peer();
        let max_fetch_headers = u64::from(self.context.config.max_fetch_headers.max(1));
        let context = &mut self.context;
        let block_store = Arc::clone(context.blockchain.block_store());

        let result = best.use_exclusively(|| -> Result<(), SyncError> {
            if last_header.height == known + 1 {
                context.check_link(&last_header, known)?;
            }
            block_store.set_header(last_header.height, &last_header)?;

            let mut last = last_header;
            loop {
                if context.is_stopped() {
                    return Err(SyncError::Interrupted);
                }
                let known = context.blockchain.height()?;
                let unknown = known + 1;
                if last.height <= unknown {
                    return Ok(());
                }

                let from = last.height.saturating_sub(max_fetch_headers).max(unknown);
                let count = last.height - from;
                let headers = context.client.fetch_headers(peer, from, count as u32)?;
                if headers.is_empty() {
                    return Err(SyncError::ShortResponse {
                        from,
                        count,
                        received: 0,
                    });
                }

                for header in headers.into_iter().rev() {
                    if header.height + 1 != last.height || header.hash() != last.last_block_hash {
                        return Err(SyncError::InvalidHeaderChain {
                            height: header.height,
                        });
                    }
                    if header.height == unknown {
                        context.check_link(&header, known)?;
                    }
                    block_store.set_header(header.height, &header)?;
                    last = header;
                }
            }
        });

        if let Err(err) = &result {
            self.context.drop_if_faulty(peer, err);
        }
        result
    }

    fn catch_up_bodies(&mut self, target: BlockHeight) -> Result<(), SyncError> {
        let known = self.context.blockchain.height()?;
        let max_fetch_bodies = u64::from(self.context.config.max_fetch_bodies.max(1));

        let mut jobs = PriorityQueue::new();
        let mut to = target;
        while to > known {
            let from = (to + 1).saturating_sub(max_fetch_bodies).max(known + 1);
            jobs.push(to, BodyJob { from, to });
            to = from - 1;
        }

        let (to_main, results) = mpsc::channel::<(BodyJob, PeerId, Result<(), SyncError>)>();
        let mut in_progress = 0;

        thread::scope(|scope| -> Result<(), SyncError> {
            loop {
                if self.context.is_stopped() {
                    return Err(SyncError::Interrupted);
                }

                while let Some(to) = jobs.peek_priority() {
                    let node = match self.context.remote_nodes.pick_idle_provider(to) {
                        Some(node) => node,
                        None => break,
                    };
                    let job = match jobs.pop() {
                        Some((_, job)) => job,
                        None => break,
                    };
                    let mut context = self.context.clone();
                    let to_main = to_main.clone();
                    in_progress += 1;
                    scope.spawn(move || {
                        let result = fetch_bodies(&mut context, &node, job);
                        let _ = to_main.send((job, node.peer(), result));
                    });
                }

                if jobs.is_empty() && in_progress == 0 {
                    return Ok(());
                }
                if in_progress == 0 {
                    if let Some(to) = jobs.peek_priority() {
                        if self.context.remote_nodes.pick_provider(to).is_none() {
                            return Err(SyncError::NoProvider { height: to });
                        }
                    }
                }

                if let Ok((job, peer, result)) = results.recv_timeout(JOB_WAIT) {
                    in_progress -= 1;
                    if let Err(err) = result {
                        if !err.is_peer_fault() {
                            return Err(err);
                        }
                        self.context.drop_if_faulty(peer, &err);
                        self.context.report(Some(peer), err);
                        jobs.push(job.to, job);
                    }
                }
            }
        })
    }

    fn update_height(&self, target: BlockHeight, consensus: &Consensus) -> Result<(), SyncError> {
        let block_store = self.context.blockchain.block_store();
        block_store.with_lock(|| -> Result<(), SyncError> {
            if target > block_store.height()? {
                block_store.set_tip(target, consensus)?;
            }
            Ok(())
        })
    }
}

fn fetch_bodies<K: KVStore, N: Network>(
    context: &mut SyncContext<K, N>,
    node: &RemoteNode,
    job: BodyJob,
) -> Result<(), SyncError> {
    let peer = node.peer();
    let count = job.to - job.from + 1;
    let block_store = Arc::clone(context.blockchain.block_store());
    let client = &mut context.client;

    node.use_exclusively(|| -> Result<(), SyncError> {
        let bodies = client.fetch_bodies(peer, job.from, count as u32)?;
        if bodies.len() as u64 != count {
            return Err(SyncError::ShortResponse {
                from: job.from,
                count,
                received: bodies.len(),
            });
        }
        for (height, body) in (job.from..=job.to).zip(bodies) {
            let header = block_store.header(height)?;
            body.validate(&header)?;
            block_store.set_body(height, &body)?;
        }
        Ok(())
    })
}
