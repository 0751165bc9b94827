//! Owner signatures and quorum verification
//!
//! Signature checking is delegated to a [`QuorumVerifier`] registered per
//! wallet. [`OwnerSet`] is the stock ed25519 implementation: a fixed set of
//! owner keys and a threshold.

use crate::{address::Address, transaction::TransactionHash};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("insufficient signatures: {provided} provided, {required} required")]
    InsufficientSignatures { required: usize, provided: usize },

    #[error("signer {0} is not an owner")]
    UnknownSigner(Address),

    #[error("signatures must be ordered by strictly ascending owner address")]
    SignersNotSorted,

    #[error("invalid signature from {0}")]
    InvalidSignature(Address),

    #[error("threshold {threshold} is invalid for {owners} owners")]
    InvalidThreshold { threshold: usize, owners: usize },
}

/// One owner's signature over a transaction hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerSignature {
    pub owner: Address,
    pub signature: Signature,
}

impl OwnerSignature {
    /// Sign `tx_hash` with an owner key
    pub fn sign(key: &SigningKey, tx_hash: &TransactionHash) -> Self {
        Self {
            owner: Address::from_verifying_key(&key.verifying_key()),
            signature: key.sign(tx_hash.as_bytes()),
        }
    }
}

/// Quorum check delegated to by the executor
pub trait QuorumVerifier: Send + Sync {
    /// Number of valid owner signatures required
    fn threshold(&self) -> usize;

    /// Verify `signatures` over `tx_hash`, returning the signers in ascending order
    fn verify(
        &self,
        tx_hash: &TransactionHash,
        signatures: &[OwnerSignature],
    ) -> Result<Vec<Address>, SignatureError>;
}

// ================================
// Stock Owner Set
// ================================

/// Fixed ed25519 owner set with an m-of-n threshold
#[derive(Debug, Clone)]
pub struct OwnerSet {
    owners: BTreeMap<Address, VerifyingKey>,
    threshold: usize,
}

impl OwnerSet {
    pub fn new(keys: impl IntoIterator<Item = VerifyingKey>, threshold: usize) -> Result<Self, SignatureError> {
        let owners: BTreeMap<Address, VerifyingKey> = keys
            .into_iter()
            .map(|key| (Address::from_verifying_key(&key), key))
            .collect();

        if threshold == 0 || threshold > owners.len() {
            return Err(SignatureError::InvalidThreshold {
                threshold,
                owners: owners.len(),
            });
        }

        Ok(Self { owners, threshold })
    }

    pub fn owners(&self) -> impl Iterator<Item = &Address> {
        self.owners.keys()
    }

    pub fn is_owner(&self, address: &Address) -> bool {
        self.owners.contains_key(address)
    }
}

impl QuorumVerifier for OwnerSet {
    fn threshold(&self) -> usize {
        self.threshold
    }

    fn verify(
        &self,
        tx_hash: &TransactionHash,
        signatures: &[OwnerSignature],
    ) -> Result<Vec<Address>, SignatureError> {
        if signatures.len() < self.threshold {
            return Err(SignatureError::InsufficientSignatures {
                required: self.threshold,
                provided: signatures.len(),
            });
        }

        let mut signers = Vec::with_capacity(self.threshold);
        let mut last: Option<Address> = None;

        // Only the first `threshold` signatures count
        for entry in signatures.iter().take(self.threshold) {
            if last.is_some_and(|previous| entry.owner <= previous) {
                return Err(SignatureError::SignersNotSorted);
            }
            let key = self
                .owners
                .get(&entry.owner)
                .ok_or(SignatureError::UnknownSigner(entry.owner))?;
            key.verify(tx_hash.as_bytes(), &entry.signature)
                .map_err(|_| SignatureError::InvalidSignature(entry.owner))?;

            last = Some(entry.owner);
            signers.push(entry.owner);
        }

        debug!(tx_hash = %tx_hash, signers = signers.len(), "quorum verified");
        Ok(signers)
    }
}
