/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide two categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: Keccak-256, provided by the [`sha3`] crate.
//! 2. **Digital Signatures**: Ed25519, provided by the [`ed25519_dalek`] crate.
//!
//! ## Signer recovery
//!
//! Validators are identified in a [`ValidatorSet`](super::validator_set::ValidatorSet) by their
//! [`Address`], not by their public key. Ed25519 signatures do not allow the public key to be recovered
//! from the signature alone, so a [`Signature`] carries the signer's verifying key alongside the
//! signature bytes. [`Signature::recover`] checks the signature against that key and returns the
//! key's address.

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::{Address, CryptoHash};
use super::merkle_tree::Hashable;

// re-exports below.
pub use sha3::Digest;
pub use sha3::Keccak256 as CryptoHasher;

pub use ed25519_dalek::{SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

/// Hash `bytes` with the crate's [`CryptoHasher`].
pub fn hash(bytes: &[u8]) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    hasher.update(bytes);
    CryptoHash::new(hasher.finalize().into())
}

/// Get the address of the account controlled by `public_key`: the last 20 bytes of the hash of the
/// key's bytes.
pub fn address_of(public_key: &VerifyingKey) -> Address {
    let digest = hash(public_key.as_bytes()).bytes();
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    Address::new(address)
}

/// A signature over a [`CryptoHash`], together with the verifying key of its signer.
///
/// Serialized as 96 raw bytes: the 32-byte verifying key followed by the 64-byte signature.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct Signature {
    signer: [u8; 32],
    signature: [u8; 64],
}

impl Signature {
    /// Assemble a `Signature` from raw parts. The parts are not checked until [`recover`](Self::recover)
    /// is called.
    pub const fn new(signer: [u8; 32], signature: [u8; 64]) -> Self {
        Self { signer, signature }
    }

    /// The verifying key bytes this signature claims to be produced by.
    pub const fn signer_bytes(&self) -> [u8; 32] {
        self.signer
    }

    /// The 64 signature bytes.
    pub const fn signature_bytes(&self) -> [u8; 64] {
        self.signature
    }

    /// Check that this signature was produced over `message` by its claimed signer, and if so, get the
    /// signer's address.
    pub fn recover(&self, message: &CryptoHash) -> Result<Address, SignatureError> {
        let signer = VerifyingKey::from_bytes(&self.signer)?;
        let signature = ed25519_dalek::Signature::from_bytes(&self.signature);
        signer.verify(&message.bytes(), &signature)?;
        Ok(address_of(&signer))
    }
}

impl Hashable for Signature {
    fn hash(&self) -> CryptoHash {
        let mut bytes = Vec::with_capacity(96);
        bytes.extend_from_slice(&self.signer);
        bytes.extend_from_slice(&self.signature);
        hash(&bytes)
    }
}

/// A facade around [`SigningKey`] that implements a method for [`sign`](Self::sign)-ing message
/// hashes, as well as getters for the [`public`](Self::public) key and [`address`](Self::address)
/// associated with the signing key.
#[derive(Clone)]
pub struct Keypair(SigningKey);

impl Keypair {
    /// Create a `Keypair` that wraps over `signing_key`.
    pub fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Sign `message` with the `Keypair`.
    pub fn sign(&self, message: &CryptoHash) -> Signature {
        Signature::new(
            self.0.verifying_key().to_bytes(),
            self.0.sign(&message.bytes()).to_bytes(),
        )
    }

    /// Get the `VerifyingKey` of this `Keypair`.
    pub fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }

    /// Get the address of this `Keypair`.
    pub fn address(&self) -> Address {
        address_of(&self.public())
    }
}
