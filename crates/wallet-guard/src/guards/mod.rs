// Guard policies consulted around every wallet transaction
//
// A guard is a pluggable policy with two checkpoints. The pre-execution check
// sees the proposed transaction, the verified signer set and the executor; the
// post-execution check sees the outcome of the underlying call. Either one can
// veto the attempt. Policies read ledger state through a read-only view and must
// not depend on any side effects of their own.

use crate::{
    address::Address,
    operation::OperationKind,
    state::StateView,
    transaction::{ProposedTransaction, TransactionHash},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod rules;

pub use rules::*;

// ================================
// Decisions
// ================================

/// Why a guard rejected a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialReason {
    /// The requested operation kind is forbidden by the guard
    DisallowedOperationKind(OperationKind),
    /// The call target is forbidden by the guard
    DisallowedTarget(Address),
    /// The underlying call failed and the guard requires success
    ExecutionFailed,
    /// The wallet's guard slot was rewritten by something other than a direct self-call
    GuardTampered,
    /// The guard rejects every transaction
    Blocked,
    /// Policy-specific reason
    Custom { code: u32, message: String },
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::DisallowedOperationKind(kind) => {
                write!(f, "operation kind {kind} is not allowed")
            }
            DenialReason::DisallowedTarget(target) => write!(f, "target {target} is not allowed"),
            DenialReason::ExecutionFailed => write!(f, "underlying call failed"),
            DenialReason::GuardTampered => write!(f, "guard was changed outside a self-call"),
            DenialReason::Blocked => write!(f, "all transactions are blocked"),
            DenialReason::Custom { code, message } => write!(f, "[{code}] {message}"),
        }
    }
}

/// Outcome of one checkpoint evaluation
///
/// Produced fresh for every invocation; never cached across transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardDecision {
    allowed: bool,
    reason: Option<DenialReason>,
}

impl GuardDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: DenialReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn reason(&self) -> Option<&DenialReason> {
        self.reason.as_ref()
    }

    pub fn into_reason(self) -> Option<DenialReason> {
        self.reason
    }
}

/// Unexpected failure raised by a guard implementation
///
/// The hook protocol treats every fault as a denial.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardFault {
    #[error("guard failed: {0}")]
    Failed(String),

    #[error("guard panicked: {0}")]
    Panicked(String),

    #[error("guard {0} is not deployed")]
    Unresolved(Address),

    #[error("guard denied without a reason")]
    MissingReason,
}

// ================================
// Checkpoint Contexts
// ================================

/// Inputs to the pre-execution checkpoint
#[derive(Debug, Clone, Copy)]
pub struct PreExecutionContext<'a> {
    pub wallet: Address,
    pub transaction: &'a ProposedTransaction,
    pub tx_hash: TransactionHash,
    pub nonce: u64,
    /// Verified signers, ascending by address
    pub signers: &'a [Address],
    /// Account that submitted the attempt
    pub executor: Address,
    pub state: StateView<'a>,
}

/// Inputs to the post-execution checkpoint
#[derive(Debug, Clone, Copy)]
pub struct PostExecutionContext<'a> {
    pub wallet: Address,
    pub transaction: &'a ProposedTransaction,
    pub tx_hash: TransactionHash,
    pub success: bool,
    /// Address of the guard snapshotted at attempt start
    pub guard: Address,
    pub state: StateView<'a>,
}

// ================================
// Guard Policy Interface
// ================================

/// A pluggable transaction guard
pub trait GuardPolicy: Send + Sync {
    /// Decide whether the transaction may execute
    fn check_before_execution(
        &self,
        ctx: &PreExecutionContext<'_>,
    ) -> Result<GuardDecision, GuardFault>;

    /// Decide whether the executed transaction may be finalized
    fn check_after_execution(
        &self,
        _ctx: &PostExecutionContext<'_>,
    ) -> Result<GuardDecision, GuardFault> {
        Ok(GuardDecision::allow())
    }

    /// Short name used in logs
    fn name(&self) -> &str {
        "guard"
    }
}
