/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The requesting side of the block sync protocol.
//!
//! [`SyncClient`] sends one [`SyncRequest`] to one peer and waits for that peer's response. Callers
//! must hold the peer's [`RemoteNode`](crate::remote_node::RemoteNode) lock for the whole exchange, so
//! that at most one request to a peer is ever outstanding.
//!
//! Any [`SyncClientError`] is the peer's fault as far as the synchronizer is concerned: the peer
//! answered with the wrong kind of response, or did not answer within the response timeout.

use std::fmt::{self, Display, Formatter};
use std::time::{Duration, Instant};

use crate::networking::{network::Network, receiving::ResponseRouter, sending::SenderHandle};
use crate::types::{
    block::{BlockBody, BlockHeader},
    consensus::Consensus,
    data_types::{BlockHeight, PeerId},
};

use super::messages::{SyncRequest, SyncResponse};

#[derive(Clone)]
pub(crate) struct SyncClient<N: Network> {
    sender: SenderHandle<N>,
    router: ResponseRouter,
    response_timeout: Duration,
}

impl<N: Network> SyncClient<N> {
    pub(crate) fn new(network: N, router: ResponseRouter, response_timeout: Duration) -> Self {
        Self {
            sender: SenderHandle::new(network),
            router,
            response_timeout,
        }
    }

    pub(crate) fn router(&self) -> ResponseRouter {
        self.router.clone()
    }

    pub(crate) fn fetch_consented_header(
        &mut self,
        peer: PeerId,
        height: BlockHeight,
    ) -> Result<(BlockHeader, Consensus), SyncClientError> {
        match self.request(peer, SyncRequest::GetConsentedHeader { height })? {
            SyncResponse::ConsentedHeader { header, consensus } => Ok((header, consensus)),
            _ => Err(SyncClientError::UnexpectedResponse),
        }
    }

    pub(crate) fn fetch_headers(
        &mut self,
        peer: PeerId,
        from: BlockHeight,
        count: u32,
    ) -> Result<Vec<BlockHeader>, SyncClientError> {
        match self.request(peer, SyncRequest::GetHeaders { from, count })? {
            SyncResponse::Headers(headers) => Ok(headers),
            _ => Err(SyncClientError::UnexpectedResponse),
        }
    }

    pub(crate) fn fetch_bodies(
        &mut self,
        peer: PeerId,
        from: BlockHeight,
        count: u32,
    ) -> Result<Vec<BlockBody>, SyncClientError> {
        match self.request(peer, SyncRequest::GetBodies { from, count })? {
            SyncResponse::Bodies(bodies) => Ok(bodies),
            _ => Err(SyncClientError::UnexpectedResponse),
        }
    }

    fn request(&mut self, peer: PeerId, request: SyncRequest) -> Result<SyncResponse, SyncClientError> {
        let slot = self.router.expect(peer);
        self.sender.send(peer, request);
        slot.recv(Instant::now() + self.response_timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncClientError {
    /// The peer answered with a response of a different kind than the request.
    UnexpectedResponse,
    /// The peer did not answer within the response timeout.
    Timeout,
    /// The node is shutting down.
    Disconnected,
}

impl Display for SyncClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SyncClientError::UnexpectedResponse => write!(f, "peer sent an unexpected response"),
            SyncClientError::Timeout => write!(f, "peer did not respond in time"),
            SyncClientError::Disconnected => write!(f, "response router disconnected"),
        }
    }
}

impl std::error::Error for SyncClientError {}
