/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Validators and the ordered sets they are grouped into.
//!
//! A [`ValidatorSet`] is expected to contain every address at most once. This is not checked: if the
//! same address appears twice, both entries count towards [`total_power`](ValidatorSet::total_power)
//! while [`power_of`](ValidatorSet::power_of) reports only the last entry.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use borsh::{BorshDeserialize, BorshSerialize};

use super::crypto_primitives::hash;
use super::data_types::{Address, CryptoHash, Power};
use super::merkle_tree::{merkle_root, Hashable};
use super::serialization::{read_list, read_u64, write_list, write_u64};

/// A participant in consensus, with its voting power.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Validator {
    pub address: Address,
    pub power: Power,
}

impl Validator {
    pub fn new(address: Address, power: Power) -> Self {
        Self { address, power }
    }
}

impl Hashable for Validator {
    fn hash(&self) -> CryptoHash {
        // Same bytes as the serialized form.
        let mut bytes = Vec::with_capacity(28);
        bytes.extend_from_slice(&self.address.bytes());
        bytes.extend_from_slice(&self.power.to_be_bytes());
        hash(&bytes)
    }
}

impl BorshSerialize for Validator {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.address.serialize(writer)?;
        write_u64(writer, self.power)
    }
}

impl BorshDeserialize for Validator {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let address = Address::deserialize_reader(reader)?;
        let power = read_u64(reader)?;
        Ok(Self { address, power })
    }
}

/// Ordered set of validators, with an address-to-power index built on construction.
#[derive(Clone, Debug)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    powers: HashMap<Address, Power>,
    total_power: u128,
}

impl ValidatorSet {
    pub fn new(validators: Vec<Validator>) -> Self {
        let mut powers = HashMap::with_capacity(validators.len());
        let mut total_power = 0u128;
        for validator in &validators {
            powers.insert(validator.address, validator.power);
            total_power += validator.power as u128;
        }
        Self {
            validators,
            powers,
            total_power,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Sum of the power of every entry in the set.
    pub fn total_power(&self) -> u128 {
        self.total_power
    }

    /// Get the power of `address`, or `None` if it is not in the set.
    pub fn power_of(&self, address: &Address) -> Option<Power> {
        self.powers.get(address).copied()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.powers.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl PartialEq for ValidatorSet {
    fn eq(&self, other: &Self) -> bool {
        self.validators == other.validators
    }
}

impl Eq for ValidatorSet {}

impl Hashable for ValidatorSet {
    fn hash(&self) -> CryptoHash {
        merkle_root(&self.validators)
    }
}

impl BorshSerialize for ValidatorSet {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_list(writer, &self.validators)
    }
}

impl BorshDeserialize for ValidatorSet {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self::new(read_list(reader)?))
    }
}
