/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that make up the chain data model, and the hashing and signing primitives they depend on.

pub mod block;

pub mod consensus;

pub mod crypto_primitives;

pub mod data_types;

pub mod merkle_tree;

pub(crate) mod serialization;

pub mod transaction;

pub mod validator_set;

pub use serialization::MAX_SAFE_INTEGER;
