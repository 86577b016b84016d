/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The serving side of the block sync protocol.
//!
//! Any peer may send sync requests, whether or not it completed the handshake. Requests are answered
//! from the local chain only:
//! - `GetConsentedHeader { height }` is answered with the header at `height` and its certificate, for any
//!   `height` between 1 and the chain height.
//! - `GetHeaders { from, count }` and `GetBodies { from, count }` are answered with the items in
//!   `from..=min(tip, from + count - 1)`, further capped to the configured maximum per response. A range
//!   that starts above the chain height is answered with an empty list.
//!
//! A request that cannot be answered gets no response. The requester's timeout handles that case.

use std::fmt::{self, Display, Formatter};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crate::block_store::pluggables::KVStore;
use crate::blockchain::{Blockchain, BlockchainError};
use crate::events::{Event, ReceiveSyncRequestEvent};
use crate::logging::first_seven_base64_chars;
use crate::networking::{network::Network, sending::SenderHandle};
use crate::types::data_types::{BlockHeight, PeerId};

use super::messages::{SyncRequest, SyncResponse};

pub struct SyncServer<K: KVStore> {
    blockchain: Arc<Blockchain<K>>,
    max_serve_headers: u32,
    max_serve_bodies: u32,
}

impl<K: KVStore> SyncServer<K> {
    pub fn new(blockchain: Arc<Blockchain<K>>, max_serve_headers: u32, max_serve_bodies: u32) -> Self {
        Self {
            blockchain,
            max_serve_headers,
            max_serve_bodies,
        }
    }

    /// Compute the response to `request`.
    pub fn serve(&self, request: &SyncRequest) -> Result<SyncResponse, SyncServerError> {
        let tip = self.blockchain.height()?;
        match *request {
            SyncRequest::GetConsentedHeader { height } => {
                if height == 0 || height > tip {
                    return Err(SyncServerError::BeyondChain { height, tip });
                }
                Ok(SyncResponse::ConsentedHeader {
                    header: self.blockchain.header_of(height)?,
                    consensus: self.blockchain.consensus_of(height)?,
                })
            }
            SyncRequest::GetHeaders { from, count } => {
                let headers = serve_range(tip, from, count.min(self.max_serve_headers))
                    .map(|height| self.blockchain.header_of(height))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SyncResponse::Headers(headers))
            }
            SyncRequest::GetBodies { from, count } => {
                let bodies = serve_range(tip, from, count.min(self.max_serve_bodies))
                    .map(|height| self.blockchain.body_of(height))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SyncResponse::Bodies(bodies))
            }
        }
    }

    /// Spawn the sync server thread, which answers the requests that the poller puts in `requests`.
    pub(crate) fn start<N: Network + 'static>(
        self,
        network: N,
        requests: Receiver<(PeerId, SyncRequest)>,
        event_publisher: Option<Sender<Event>>,
        shutdown_signal: Receiver<()>,
    ) -> JoinHandle<()> {
        let mut sender = SenderHandle::new(network);
        thread::spawn(move || loop {
            match shutdown_signal.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    panic!("Sync server thread disconnected from main thread")
                }
            }

            match requests.recv_timeout(Duration::from_millis(10)) {
                Ok((origin, request)) => {
                    match self.serve(&request) {
                        Ok(response) => sender.send(origin, response),
                        Err(err) => log::debug!(
                            "not answering {:?} from {}: {}",
                            request,
                            first_seven_base64_chars(origin.as_bytes()),
                            err
                        ),
                    }
                    Event::ReceiveSyncRequest(ReceiveSyncRequestEvent {
                        timestamp: SystemTime::now(),
                        peer: origin,
                        request,
                    })
                    .publish(&event_publisher);
                }
                Err(RecvTimeoutError::Timeout) => (),
                Err(RecvTimeoutError::Disconnected) => thread::sleep(Duration::from_millis(10)),
            }
        })
    }
}

// Heights in `from..=min(tip, from + count - 1)`. Height 0 holds no block, so ranges start at 1 at the
// earliest.
fn serve_range(tip: BlockHeight, from: BlockHeight, count: u32) -> std::ops::RangeInclusive<BlockHeight> {
    let from = from.max(1);
    let last = tip.min(from.saturating_add(u64::from(count)) - 1);
    from..=last
}

#[derive(Debug)]
pub enum SyncServerError {
    /// The requested certified header is not on the local chain.
    BeyondChain { height: BlockHeight, tip: BlockHeight },
    Blockchain(BlockchainError),
}

impl From<BlockchainError> for SyncServerError {
    fn from(value: BlockchainError) -> Self {
        SyncServerError::Blockchain(value)
    }
}

impl Display for SyncServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SyncServerError::BeyondChain { height, tip } => {
                write!(f, "height {} is not on the chain (tip {})", height, tip)
            }
            SyncServerError::Blockchain(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SyncServerError {}
