//! Calls a wallet accepts on its own address

use crate::address::Address;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::io;

/// Wallet self-management call, borsh encoded as a transaction payload
///
/// Only honored when the wallet calls itself with a `DirectCall`, which means it
/// went through signature verification and both guard checkpoints first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum WalletCall {
    /// Replace the active guard; `None` (or the zero address) clears it
    SetGuard { guard: Option<Address> },
}

impl WalletCall {
    pub fn set_guard(guard: Option<Address>) -> Self {
        Self::SetGuard { guard }
    }

    pub fn encode(&self) -> io::Result<Vec<u8>> {
        self.try_to_vec()
    }

    pub fn decode(payload: &[u8]) -> io::Result<Self> {
        Self::try_from_slice(payload)
    }
}
