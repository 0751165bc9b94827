//! Proposed wallet transactions and their signing hash

use crate::{address::Address, operation::OperationKind};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Domain tag prepended to every transaction hash preimage
pub const TRANSACTION_HASH_DOMAIN: &[u8] = b"wallet-guard/transaction/v1";

// ================================
// Proposed Transaction
// ================================

/// A transaction proposed for execution by a wallet
///
/// Built once per attempt and never mutated after owners have signed its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ProposedTransaction {
    pub target: Address,
    pub value: u128,
    #[serde(with = "hex_bytes", default)]
    pub payload: Vec<u8>,
    pub operation: OperationKind,
}

impl ProposedTransaction {
    pub fn new(target: Address, value: u128, payload: Vec<u8>, operation: OperationKind) -> Self {
        Self { target, value, payload, operation }
    }

    /// Bare call with no value and no payload
    pub fn call(target: Address, operation: OperationKind) -> Self {
        Self::new(target, 0, Vec::new(), operation)
    }

    /// Hash owners sign for this transaction on `wallet` at `nonce`
    ///
    /// Fails only when the payload is too long for a borsh length prefix.
    pub fn hash(&self, wallet: &Address, nonce: u64) -> Result<TransactionHash, HashError> {
        let preimage = HashPreimage {
            wallet: *wallet,
            target: self.target,
            value: self.value,
            payload: self.payload.clone(),
            operation: self.operation,
            nonce,
        };
        let encoded = preimage
            .try_to_vec()
            .map_err(|e| HashError(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(TRANSACTION_HASH_DOMAIN);
        hasher.update(encoded);
        Ok(TransactionHash(hasher.finalize().into()))
    }
}

/// Canonical field order of the hash preimage
#[derive(BorshSerialize)]
struct HashPreimage {
    wallet: Address,
    target: Address,
    value: u128,
    payload: Vec<u8>,
    operation: OperationKind,
    nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transaction preimage cannot be encoded: {0}")]
pub struct HashError(pub String);

// ================================
// Transaction Hash
// ================================

/// SHA-256 digest identifying one transaction at one nonce
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct TransactionHash(pub [u8; 32]);

impl TransactionHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionHash({self})")
    }
}

impl Serialize for TransactionHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Serde adapter encoding byte vectors as `0x`-prefixed hex strings
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}
