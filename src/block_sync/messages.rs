/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Requests and responses of the block sync protocol.
//!
//! Every request is answered by exactly one response of the matching kind:
//!
//! |Request|Response|
//! |---|---|
//! |[`GetConsentedHeader`](SyncRequest::GetConsentedHeader)|[`ConsentedHeader`](SyncResponse::ConsentedHeader)|
//! |[`GetHeaders`](SyncRequest::GetHeaders)|[`Headers`](SyncResponse::Headers)|
//! |[`GetBodies`](SyncRequest::GetBodies)|[`Bodies`](SyncResponse::Bodies)|

use crate::types::{
    block::{BlockBody, BlockHeader},
    consensus::Consensus,
    data_types::BlockHeight,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncRequest {
    /// Ask for the header at `height` together with the certificate for it.
    GetConsentedHeader { height: BlockHeight },
    /// Ask for up to `count` headers starting at `from`, in ascending height order.
    GetHeaders { from: BlockHeight, count: u32 },
    /// Ask for up to `count` bodies starting at `from`, in ascending height order.
    GetBodies { from: BlockHeight, count: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncResponse {
    ConsentedHeader { header: BlockHeader, consensus: Consensus },
    Headers(Vec<BlockHeader>),
    Bodies(Vec<BlockBody>),
}
