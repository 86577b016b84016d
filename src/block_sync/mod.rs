/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The request-response protocol that peers use to download headers, bodies, and certificates from each
//! other.

pub(crate) mod client;

pub mod messages;

pub mod server;
pub use client::SyncClientError;
