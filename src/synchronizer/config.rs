/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tunable parameters of the [`Synchronizer`](super::Synchronizer).
//!
//! Every field has a default, so the builder can be used to override only what is needed:
//!
//! ```ignore
//! let configuration =
//!     SynchronizerConfiguration::builder()
//!     .catch_up_interval(Duration::from_secs(5))
//!     .trust_policy(TrustPolicy::Dynamic { trust_consensus_period: DEFAULT_TRUST_CONSENSUS_PERIOD })
//!     .build()
//! ```

use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::types::data_types::BlockHeight;

/// Suggested `trust_consensus_period` for [`TrustPolicy::Dynamic`]: one day, matching how long
/// validators must wait to withdraw their stake.
pub const DEFAULT_TRUST_CONSENSUS_PERIOD: Duration = Duration::from_secs(86_400);

/// Which validator set certificates fetched from peers are checked against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Always the validator set announced by the genesis block.
    Static,
    /// The `next_validator_set` of the block at the local chain height, as long as that block is
    /// younger than `trust_consensus_period`. An older block's validator set is not trusted, and any
    /// validation that needs it fails.
    Dynamic { trust_consensus_period: Duration },
}

#[derive(Clone, Debug, TypedBuilder)]
pub struct SynchronizerConfiguration {
    #[builder(default = Duration::from_millis(500), setter(doc = "Set how long to wait for an announced block to arrive on its own before fetching it."))]
    pub wait_for_fetch: Duration,
    #[builder(default = Duration::from_millis(1000), setter(doc = "Set how long the chain may go without organic progress before a catch-up is attempted."))]
    pub catch_up_interval: Duration,
    #[builder(default = TrustPolicy::Static)]
    pub trust_policy: TrustPolicy,
    #[builder(default = 1000, setter(doc = "Set the maximum number of headers requested at once during catch-up."))]
    pub max_fetch_headers: u32,
    #[builder(default = 100, setter(doc = "Set the maximum number of bodies requested at once during catch-up."))]
    pub max_fetch_bodies: u32,
    #[builder(default = 50, setter(doc = "Set how far ahead of the chain height a received block may be and still be kept."))]
    pub max_pending_gap: BlockHeight,
    #[builder(default = Duration::from_secs(10), setter(doc = "Set how long to wait for a peer to answer a sync request."))]
    pub response_timeout: Duration,
}

impl Default for SynchronizerConfiguration {
    fn default() -> Self {
        Self::builder().build()
    }
}
