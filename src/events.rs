/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of events for event handling and logging.
//!
//! Note: an event for a given action indicates that the action has been completed.
//!
//! [`SyncError`](Event::SyncError) events are the node's error stream: every failure the synchronizer
//! recovers from by itself is reported there instead of being returned to a caller.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::block_sync::messages::SyncRequest;
use crate::synchronizer::SyncError;
use crate::types::data_types::{BlockHeight, CryptoHash, PeerId};

pub enum Event {
    // Events that change persistent state.
    InsertBlock(InsertBlockEvent),
    // Events that involve receiving a gossip message.
    ReceiveNewBlock(ReceiveNewBlockEvent),
    CompleteHandshake(CompleteHandshakeEvent),
    // Sync events.
    ScheduleFetch(ScheduleFetchEvent),
    StartCatchUp(StartCatchUpEvent),
    EndCatchUp(EndCatchUpEvent),
    ReceiveSyncRequest(ReceiveSyncRequestEvent),
    // Peer management and errors.
    DropPeer(DropPeerEvent),
    SyncError(SyncErrorEvent),
}

impl Event {
    /// Send the event to the event bus, if there is one. Events published after the bus has shut down
    /// are discarded.
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

/// A block was applied on top of the chain. `origin` is `None` for locally produced blocks.
pub struct InsertBlockEvent {
    pub timestamp: SystemTime,
    pub height: BlockHeight,
    pub hash: CryptoHash,
    pub origin: Option<PeerId>,
}

pub struct ReceiveNewBlockEvent {
    pub timestamp: SystemTime,
    pub origin: PeerId,
    pub height: BlockHeight,
    pub hash: CryptoHash,
}

/// A peer's `Hello` matched our genesis block, and the peer was registered.
pub struct CompleteHandshakeEvent {
    pub timestamp: SystemTime,
    pub peer: PeerId,
    pub height: BlockHeight,
}

pub struct ScheduleFetchEvent {
    pub timestamp: SystemTime,
    pub height: BlockHeight,
}

pub struct StartCatchUpEvent {
    pub timestamp: SystemTime,
    pub peer: PeerId,
    pub target_height: BlockHeight,
}

/// A catch-up attempt finished successfully. `height` is the chain height afterwards.
pub struct EndCatchUpEvent {
    pub timestamp: SystemTime,
    pub peer: PeerId,
    pub height: BlockHeight,
}

pub struct ReceiveSyncRequestEvent {
    pub timestamp: SystemTime,
    pub peer: PeerId,
    pub request: SyncRequest,
}

pub struct DropPeerEvent {
    pub timestamp: SystemTime,
    pub peer: PeerId,
    pub reason: String,
}

pub struct SyncErrorEvent {
    pub timestamp: SystemTime,
    /// The peer whose data or behavior caused the error, if any.
    pub peer: Option<PeerId>,
    pub error: SyncError,
}
