/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Binary Merkle root over an ordered list of hashable items.
//!
//! The tree is unbalanced in a fixed way: a list of `n > 1` items is split so that the left subtree
//! holds the largest power of two strictly smaller than `n` items, and the right subtree holds the
//! rest. For example, five items `[a, b, c, d, e]` produce:
//!
//! ```text
//!              root
//!            /      \
//!        H(ab,cd)    e
//!        /    \
//!     H(a,b)  H(c,d)
//! ```
//!
//! A single item's root is that item's own hash, with no further hashing. The root of an empty list is
//! the hash of the empty byte string.

use super::crypto_primitives::hash;
use super::data_types::CryptoHash;

/// Implemented by every type that can be a leaf of a Merkle tree.
pub trait Hashable {
    fn hash(&self) -> CryptoHash;
}

/// Compute the Merkle root of `items`.
pub fn merkle_root<T: Hashable>(items: &[T]) -> CryptoHash {
    match items.len() {
        0 => hash(&[]),
        1 => items[0].hash(),
        n => {
            let split = n.next_power_of_two() >> 1;
            let left = merkle_root(&items[..split]);
            let right = merkle_root(&items[split..]);
            let mut concatenated = Vec::with_capacity(64);
            concatenated.extend_from_slice(&left.bytes());
            concatenated.extend_from_slice(&right.bytes());
            hash(&concatenated)
        }
    }
}

impl Hashable for CryptoHash {
    fn hash(&self) -> CryptoHash {
        *self
    }
}
