// Guard hook protocol: the two checkpoints around an underlying call
//
// The executor pins the active guard in a `GuardSnapshot` at attempt start and
// hands the same snapshot to both checkpoints. A checkpoint either passes or
// yields a `HookError`; there is no third outcome. Denials carry the guard's
// structured reason. Errors and panics raised inside the guard are faults and
// abort the attempt exactly like a denial.

use crate::{
    address::Address,
    guards::{DenialReason, GuardDecision, GuardFault, GuardPolicy, PostExecutionContext, PreExecutionContext},
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

// ================================
// Snapshot
// ================================

/// Guard pinned for the lifetime of one attempt
#[derive(Clone)]
pub struct ActiveGuard {
    pub address: Address,
    pub policy: Arc<dyn GuardPolicy>,
}

impl fmt::Debug for ActiveGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveGuard")
            .field("address", &self.address)
            .field("policy", &self.policy.name())
            .finish()
    }
}

/// The guard an attempt is evaluated against, read once at attempt start
#[derive(Debug, Clone, Default)]
pub struct GuardSnapshot {
    active: Option<ActiveGuard>,
}

impl GuardSnapshot {
    pub fn none() -> Self {
        Self { active: None }
    }

    pub fn active(guard: ActiveGuard) -> Self {
        Self { active: Some(guard) }
    }

    pub fn guard_address(&self) -> Option<Address> {
        self.active.as_ref().map(|guard| guard.address)
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_none()
    }
}

// ================================
// Checkpoints and Errors
// ================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardCheckpoint {
    PreExecution,
    PostExecution,
}

impl fmt::Display for GuardCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardCheckpoint::PreExecution => write!(f, "pre-execution"),
            GuardCheckpoint::PostExecution => write!(f, "post-execution"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("guard {guard} denied the transaction at {checkpoint}: {reason}")]
    Denied {
        guard: Address,
        checkpoint: GuardCheckpoint,
        reason: DenialReason,
    },

    #[error("guard {guard} faulted at {checkpoint}: {source}")]
    Fault {
        guard: Address,
        checkpoint: GuardCheckpoint,
        #[source]
        source: GuardFault,
    },
}

impl HookError {
    pub fn checkpoint(&self) -> GuardCheckpoint {
        match self {
            HookError::Denied { checkpoint, .. } | HookError::Fault { checkpoint, .. } => *checkpoint,
        }
    }

    pub fn denial_reason(&self) -> Option<&DenialReason> {
        match self {
            HookError::Denied { reason, .. } => Some(reason),
            HookError::Fault { .. } => None,
        }
    }
}

// ================================
// Protocol
// ================================

/// Runs guard checkpoints with fail-closed semantics
pub struct GuardHookProtocol;

impl GuardHookProtocol {
    /// Pre-execution checkpoint. A no-op when no guard is pinned.
    pub fn pre_check(snapshot: &GuardSnapshot, ctx: &PreExecutionContext<'_>) -> Result<(), HookError> {
        let Some(guard) = &snapshot.active else {
            return Ok(());
        };
        debug!(
            wallet = %ctx.wallet,
            tx_hash = %ctx.tx_hash,
            guard = %guard.address,
            "running pre-execution guard check"
        );

        let outcome = Self::invoke(|| guard.policy.check_before_execution(ctx));
        Self::settle(guard.address, GuardCheckpoint::PreExecution, outcome)
    }

    /// Post-execution checkpoint. A no-op when no guard is pinned.
    pub fn post_check(snapshot: &GuardSnapshot, ctx: &PostExecutionContext<'_>) -> Result<(), HookError> {
        let Some(guard) = &snapshot.active else {
            return Ok(());
        };
        debug!(
            wallet = %ctx.wallet,
            tx_hash = %ctx.tx_hash,
            guard = %guard.address,
            success = ctx.success,
            "running post-execution guard check"
        );

        let outcome = Self::invoke(|| guard.policy.check_after_execution(ctx));
        Self::settle(guard.address, GuardCheckpoint::PostExecution, outcome)
    }

    fn invoke<F>(check: F) -> Result<GuardDecision, GuardFault>
    where
        F: FnOnce() -> Result<GuardDecision, GuardFault>,
    {
        // Policies only get shared references, so a panic cannot leave them half-updated
        catch_unwind(AssertUnwindSafe(check))
            .unwrap_or_else(|payload| Err(GuardFault::Panicked(panic_message(payload.as_ref()))))
    }

    fn settle(
        guard: Address,
        checkpoint: GuardCheckpoint,
        outcome: Result<GuardDecision, GuardFault>,
    ) -> Result<(), HookError> {
        let decision = match outcome {
            Ok(decision) => decision,
            Err(source) => {
                warn!(guard = %guard, %checkpoint, error = %source, "guard fault");
                return Err(HookError::Fault {
                    guard,
                    checkpoint,
                    source,
                });
            }
        };

        if decision.is_allowed() {
            return Ok(());
        }

        match decision.into_reason() {
            Some(reason) => {
                warn!(guard = %guard, %checkpoint, %reason, "guard denied transaction");
                Err(HookError::Denied {
                    guard,
                    checkpoint,
                    reason,
                })
            }
            None => Err(HookError::Fault {
                guard,
                checkpoint,
                source: GuardFault::MissingReason,
            }),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
