//! Attempt-level error taxonomy

use crate::{
    call::CallError,
    executor::AttemptState,
    guards::DenialReason,
    hooks::HookError,
    ledger::LedgerError,
    signatures::SignatureError,
    state::StateError,
};
use thiserror::Error;

// ================================
// Error Types
// ================================

/// Why an attempt did not finalize
///
/// Every variant leaves the ledger exactly as it was before the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Guard denial or guard fault at either checkpoint
    #[error(transparent)]
    Guard(#[from] HookError),

    /// Quorum not met; raised before any guard runs
    #[error("signature verification failed: {0}")]
    Signature(#[from] SignatureError),

    /// Underlying call failed under the revert-on-failure policy
    #[error("underlying call failed: {0}")]
    CallFailed(CallError),

    #[error("payload of {size} bytes exceeds limit of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("invalid attempt transition from {from} to {to}")]
    InvalidTransition { from: AttemptState, to: AttemptState },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl ExecutionError {
    /// Structured reason when the attempt was denied by a guard
    pub fn denial_reason(&self) -> Option<&DenialReason> {
        match self {
            ExecutionError::Guard(hook) => hook.denial_reason(),
            _ => None,
        }
    }

    pub fn is_guard_denial(&self) -> bool {
        self.denial_reason().is_some()
    }

    pub fn is_guard_fault(&self) -> bool {
        matches!(self, ExecutionError::Guard(HookError::Fault { .. }))
    }
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
