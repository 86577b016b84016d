/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the node's
//! [config](crate::node::Configuration).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceiveNewBlock](crate::events::ReceiveNewBlockEvent) is printed:
//!
//! ```text
//! ReceiveNewBlock, 1701329264, Id5u7f6, fNGCJyk, 12
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the public key of the
//!   peer that sent the block.
//! - The fourth value is the first seven characters of the Base64 encoding of the hash of the block.
//! - The fifth value is the height of the block.
//!
//! [`SyncError`](crate::events::SyncErrorEvent) and [`DropPeer`](crate::events::DropPeerEvent) are
//! logged at the `warn` level. Every other event is logged at the `info` level.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const INSERT_BLOCK: &str = "InsertBlock";
pub const RECEIVE_NEW_BLOCK: &str = "ReceiveNewBlock";
pub const COMPLETE_HANDSHAKE: &str = "CompleteHandshake";
pub const SCHEDULE_FETCH: &str = "ScheduleFetch";
pub const START_CATCH_UP: &str = "StartCatchUp";
pub const END_CATCH_UP: &str = "EndCatchUp";
pub const RECEIVE_SYNC_REQUEST: &str = "ReceiveSyncRequest";
pub const DROP_PEER: &str = "DropPeer";
pub const SYNC_ERROR: &str = "SyncError";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for InsertBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |insert_block_event: &InsertBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                INSERT_BLOCK,
                secs_since_unix_epoch(insert_block_event.timestamp),
                first_seven_base64_chars(&insert_block_event.hash.bytes()),
                insert_block_event.height,
                match insert_block_event.origin {
                    Some(origin) => first_seven_base64_chars(origin.as_bytes()),
                    None => String::from("local"),
                }
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveNewBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_new_block_event: &ReceiveNewBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_NEW_BLOCK,
                secs_since_unix_epoch(receive_new_block_event.timestamp),
                first_seven_base64_chars(receive_new_block_event.origin.as_bytes()),
                first_seven_base64_chars(&receive_new_block_event.hash.bytes()),
                receive_new_block_event.height
            )
        };
        Box::new(logger)
    }
}

impl Logger for CompleteHandshakeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |complete_handshake_event: &CompleteHandshakeEvent| {
            log::info!(
                "{}, {}, {}, {}",
                COMPLETE_HANDSHAKE,
                secs_since_unix_epoch(complete_handshake_event.timestamp),
                first_seven_base64_chars(complete_handshake_event.peer.as_bytes()),
                complete_handshake_event.height
            )
        };
        Box::new(logger)
    }
}

impl Logger for ScheduleFetchEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |schedule_fetch_event: &ScheduleFetchEvent| {
            log::info!(
                "{}, {}, {}",
                SCHEDULE_FETCH,
                secs_since_unix_epoch(schedule_fetch_event.timestamp),
                schedule_fetch_event.height
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartCatchUpEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_catch_up_event: &StartCatchUpEvent| {
            log::info!(
                "{}, {}, {}, {}",
                START_CATCH_UP,
                secs_since_unix_epoch(start_catch_up_event.timestamp),
                first_seven_base64_chars(start_catch_up_event.peer.as_bytes()),
                start_catch_up_event.target_height
            )
        };
        Box::new(logger)
    }
}

impl Logger for EndCatchUpEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |end_catch_up_event: &EndCatchUpEvent| {
            log::info!(
                "{}, {}, {}, {}",
                END_CATCH_UP,
                secs_since_unix_epoch(end_catch_up_event.timestamp),
                first_seven_base64_chars(end_catch_up_event.peer.as_bytes()),
                end_catch_up_event.height
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveSyncRequestEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_sync_request_event: &ReceiveSyncRequestEvent| {
            log::info!(
                "{}, {}, {}, {:?}",
                RECEIVE_SYNC_REQUEST,
                secs_since_unix_epoch(receive_sync_request_event.timestamp),
                first_seven_base64_chars(receive_sync_request_event.peer.as_bytes()),
                receive_sync_request_event.request
            )
        };
        Box::new(logger)
    }
}

impl Logger for DropPeerEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |drop_peer_event: &DropPeerEvent| {
            log::warn!(
                "{}, {}, {}, {}",
                DROP_PEER,
                secs_since_unix_epoch(drop_peer_event.timestamp),
                first_seven_base64_chars(drop_peer_event.peer.as_bytes()),
                drop_peer_event.reason
            )
        };
        Box::new(logger)
    }
}

impl Logger for SyncErrorEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |sync_error_event: &SyncErrorEvent| {
            log::warn!(
                "{}, {}, {}, {}",
                SYNC_ERROR,
                secs_since_unix_epoch(sync_error_event.timestamp),
                match sync_error_event.peer {
                    Some(peer) => first_seven_base64_chars(peer.as_bytes()),
                    None => String::from("-"),
                },
                sync_error_event.error
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
