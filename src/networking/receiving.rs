/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for receiving messages from the P2P network.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use crate::block_sync::client::SyncClientError;
use crate::block_sync::messages::{SyncRequest, SyncResponse};
use crate::types::data_types::PeerId;

use super::{
    messages::{GossipMessage, Message},
    network::Network,
};

/// Spawn the poller thread, which polls the [`Network`] for messages and distributes them into receiver
/// handles.
///
/// The kinds of messages that the poller distributes are:
/// 1. Gossip messages (processed by the [node](crate::node)'s dispatcher),
/// 2. Sync requests (processed by the [`SyncServer`][crate::block_sync::server::SyncServer]), and
/// 3. Sync responses, which are handed to the request waiting for them through `router`. A response
///    that no request is waiting for is returned through the third receiver so that its sender can be
///    dropped.
pub(crate) fn start_polling<N: Network + 'static>(
    mut network: N,
    router: ResponseRouter,
    shutdown_signal: Receiver<()>,
) -> (
    JoinHandle<()>,
    Receiver<(PeerId, GossipMessage)>,
    Receiver<(PeerId, SyncRequest)>,
    Receiver<(PeerId, SyncResponse)>,
) {
    let (to_gossip_receiver, gossip_receiver) = mpsc::channel();
    let (to_sync_request_receiver, sync_request_receiver) = mpsc::channel();
    let (to_unsolicited_receiver, unsolicited_receiver) = mpsc::channel();

    let poller_thread = thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Poller thread disconnected from main thread")
            }
        }

        if let Some((origin, msg)) = network.recv() {
            match msg {
                Message::GossipMessage(g_msg) => {
                    let _ = to_gossip_receiver.send((origin, g_msg));
                }
                Message::SyncRequest(s_req) => {
                    let _ = to_sync_request_receiver.send((origin, s_req));
                }
                Message::SyncResponse(s_res) => {
                    if let Err(s_res) = router.route(origin, s_res) {
                        let _ = to_unsolicited_receiver.send((origin, s_res));
                    }
                }
            }
        } else {
            thread::yield_now()
        }
    });
    (
        poller_thread,
        gossip_receiver,
        sync_request_receiver,
        unsolicited_receiver,
    )
}

/// Hands each [`SyncResponse`] to the request that is waiting for a response from its sender.
///
/// At most one request per peer is outstanding at a time (requests to a peer are made under that
/// peer's [`RemoteNode`](crate::remote_node::RemoteNode) lock), so a single slot per peer suffices.
#[derive(Clone, Default)]
pub(crate) struct ResponseRouter {
    waiting: Arc<Mutex<HashMap<PeerId, (u64, Sender<SyncResponse>)>>>,
    next_ticket: Arc<AtomicU64>,
}

impl ResponseRouter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start waiting for a response from `peer`. Must be called before the request is sent.
    pub(crate) fn expect(&self, peer: PeerId) -> ResponseSlot {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel();
        self.waiting().insert(peer, (ticket, sender));
        ResponseSlot {
            peer,
            ticket,
            receiver,
            router: self.clone(),
        }
    }

    /// Deliver `response` to the request waiting on `origin`. Gives the response back if no request is
    /// waiting.
    pub(crate) fn route(&self, origin: PeerId, response: SyncResponse) -> Result<(), SyncResponse> {
        match self.waiting().remove(&origin) {
            Some((_, sender)) => sender.send(response).map_err(|err| err.0),
            None => Err(response),
        }
    }

    fn waiting(&self) -> MutexGuard<'_, HashMap<PeerId, (u64, Sender<SyncResponse>)>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The receiving end of one outstanding request. Dropping the slot stops waiting, after which a late
/// response from the peer counts as unsolicited.
pub(crate) struct ResponseSlot {
    peer: PeerId,
    ticket: u64,
    receiver: Receiver<SyncResponse>,
    router: ResponseRouter,
}

impl ResponseSlot {
    pub(crate) fn recv(&self, deadline: Instant) -> Result<SyncResponse, SyncClientError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.receiver.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => Err(SyncClientError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(SyncClientError::Disconnected),
        }
    }
}

impl Drop for ResponseSlot {
    fn drop(&mut self) {
        let mut waiting = self.router.waiting();
        if waiting.get(&self.peer).is_some_and(|(ticket, _)| *ticket == self.ticket) {
            waiting.remove(&self.peer);
        }
    }
}
