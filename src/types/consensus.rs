/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Threshold-signature certificates over block hashes.
//!
//! A [`Consensus`] is just a list of signatures. Whether it certifies anything depends on the message
//! hash and the validator set it is checked against: see [`Consensus::validate`].

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::io::{self, Read, Write};

use borsh::{BorshDeserialize, BorshSerialize};

use super::crypto_primitives::Signature;
use super::data_types::{Address, CryptoHash};
use super::merkle_tree::{merkle_root, Hashable};
use super::serialization::{read_list, write_list};
use super::validator_set::ValidatorSet;

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Consensus {
    signatures: Vec<Signature>,
}

impl Consensus {
    pub fn new(signatures: Vec<Signature>) -> Self {
        Self { signatures }
    }

    /// A certificate with no signatures. Carried by the genesis block as its `last_block_consensus`.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Check that the signatures in this certificate were produced over `message` by distinct members
    /// of `validator_set`, and that together they hold at least two thirds of the set's total power.
    pub fn validate(&self, message: &CryptoHash, validator_set: &ValidatorSet) -> Result<(), ConsensusError> {
        let mut signers = HashSet::with_capacity(self.signatures.len());
        let mut signed_power: u128 = 0;

        for signature in &self.signatures {
            let address = signature
                .recover(message)
                .map_err(|_| ConsensusError::UnrecoverableSignature)?;

            let power = validator_set
                .power_of(&address)
                .ok_or(ConsensusError::UnknownSigner { address })?;

            if !signers.insert(address) {
                return Err(ConsensusError::DuplicateSigner { address });
            }

            signed_power += power as u128;
        }

        let total_power = validator_set.total_power();
        if signed_power * 3 >= total_power * 2 {
            Ok(())
        } else {
            Err(ConsensusError::InsufficientPower {
                signed: signed_power,
                total: total_power,
            })
        }
    }
}

impl Hashable for Consensus {
    fn hash(&self) -> CryptoHash {
        merkle_root(&self.signatures)
    }
}

impl BorshSerialize for Consensus {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_list(writer, &self.signatures)
    }
}

impl BorshDeserialize for Consensus {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self::new(read_list(reader)?))
    }
}

/// Reasons a [`Consensus`] fails to certify a message hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// A signature does not verify against its claimed signer.
    UnrecoverableSignature,
    /// A signature was produced by an address outside the validator set.
    UnknownSigner { address: Address },
    /// The same address signed more than once.
    DuplicateSigner { address: Address },
    /// The signers together hold less than two thirds of the total power.
    InsufficientPower { signed: u128, total: u128 },
}

impl Display for ConsensusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::UnrecoverableSignature => write!(f, "signature could not be recovered"),
            ConsensusError::UnknownSigner { address } => {
                write!(f, "signer {} is not in the validator set", address)
            }
            ConsensusError::DuplicateSigner { address } => {
                write!(f, "signer {} signed more than once", address)
            }
            ConsensusError::InsufficientPower { signed, total } => {
                write!(f, "signed power {} is less than 2/3 of total power {}", signed, total)
            }
        }
    }
}

impl std::error::Error for ConsensusError {}
