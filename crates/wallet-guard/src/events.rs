//! Wallet events recorded in the ledger log

use crate::{address::Address, transaction::TransactionHash};
use serde::Serialize;

/// Events emitted by wallets during an attempt
///
/// Events raised by an attempt that later aborts are discarded with the rest of
/// its effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WalletEvent {
    ChangedGuard {
        wallet: Address,
        guard: Option<Address>,
    },
    ExecutionSuccess {
        wallet: Address,
        tx_hash: TransactionHash,
    },
    ExecutionFailure {
        wallet: Address,
        tx_hash: TransactionHash,
    },
}

impl WalletEvent {
    pub fn wallet(&self) -> Address {
        match self {
            WalletEvent::ChangedGuard { wallet, .. }
            | WalletEvent::ExecutionSuccess { wallet, .. }
            | WalletEvent::ExecutionFailure { wallet, .. } => *wallet,
        }
    }
}
