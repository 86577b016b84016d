/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Keys of the block store's state variables.
//!
//! |Variable|Key|Value|
//! |---|---|---|
//! |Chain height|`b"height"`|8-byte big-endian height|
//! |Last consensus|`b"consensus"`|Serialized [`Consensus`](crate::types::consensus::Consensus) certifying the block at the chain height|
//! |Header at `h`|`b'h'` ++ 8-byte big-endian `h`|Serialized [`BlockHeader`](crate::types::block::BlockHeader)|
//! |Body at `h`|`b'b'` ++ 8-byte big-endian `h`|Serialized [`BlockBody`](crate::types::block::BlockBody)|

use crate::types::data_types::BlockHeight;

pub const HEIGHT: [u8; 6] = *b"height";
pub const LAST_CONSENSUS: [u8; 9] = *b"consensus";
pub const HEADER_PREFIX: u8 = b'h';
pub const BODY_PREFIX: u8 = b'b';

pub fn header_key(height: BlockHeight) -> [u8; 9] {
    height_key(HEADER_PREFIX, height)
}

pub fn body_key(height: BlockHeight) -> [u8; 9] {
    height_key(BODY_PREFIX, height)
}

fn height_key(prefix: u8, height: BlockHeight) -> [u8; 9] {
    let mut key = [0u8; 9];
    key[0] = prefix;
    key[1..].copy_from_slice(&height.to_be_bytes());
    key
}
