// Stock composable guard rules
// Serializable so guards can be configured from JSON.
use super::{DenialReason, GuardDecision, GuardFault, GuardPolicy, PostExecutionContext, PreExecutionContext};
use crate::{address::Address, operation::OperationKind, registry::GuardRegistry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum nesting depth of composite rules
pub const MAX_GUARD_RULE_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("guard rule nesting depth {depth} exceeds maximum {max}")]
    TooDeep { depth: usize, max: usize },
}

/// Declarative guard built from simple checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardRule {
    /// Allows everything at both checkpoints
    AllowAll,
    /// Denies everything before execution
    DenyAll,
    /// Denies one operation kind before execution
    DenyOperation(OperationKind),
    /// Denies calls to one target before execution
    DenyTarget(Address),
    /// Denies finalization of failed calls
    RequireSuccess,
    /// Denies finalization when the wallet's guard slot changed outside a direct self-call
    GuardIntegrity,
    /// Both rules must allow
    And(Box<GuardRule>, Box<GuardRule>),
    /// Either rule may allow; the left denial is reported when both deny
    Or(Box<GuardRule>, Box<GuardRule>),
}

impl GuardRule {
    /// The stock policy forbidding context-sharing calls
    pub fn no_context_sharing() -> Self {
        Self::DenyOperation(OperationKind::ContextSharingCall)
    }

    pub fn and(self, other: GuardRule) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: GuardRule) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    pub fn depth(&self) -> usize {
        match self {
            GuardRule::And(a, b) | GuardRule::Or(a, b) => 1 + a.depth().max(b.depth()),
            _ => 1,
        }
    }

    /// Reject rules nested deeper than `MAX_GUARD_RULE_DEPTH`
    pub fn validate(&self) -> Result<(), RuleError> {
        let depth = self.depth();
        if depth > MAX_GUARD_RULE_DEPTH {
            return Err(RuleError::TooDeep {
                depth,
                max: MAX_GUARD_RULE_DEPTH,
            });
        }
        Ok(())
    }

    fn before(&self, ctx: &PreExecutionContext<'_>) -> Result<GuardDecision, GuardFault> {
        match self {
            GuardRule::AllowAll | GuardRule::RequireSuccess | GuardRule::GuardIntegrity => {
                Ok(GuardDecision::allow())
            }
            GuardRule::DenyAll => Ok(GuardDecision::deny(DenialReason::Blocked)),
            GuardRule::DenyOperation(kind) => {
                if ctx.transaction.operation == *kind {
                    Ok(GuardDecision::deny(DenialReason::DisallowedOperationKind(*kind)))
                } else {
                    Ok(GuardDecision::allow())
                }
            }
            GuardRule::DenyTarget(target) => {
                if ctx.transaction.target == *target {
                    Ok(GuardDecision::deny(DenialReason::DisallowedTarget(*target)))
                } else {
                    Ok(GuardDecision::allow())
                }
            }
            GuardRule::And(a, b) => {
                let left = a.before(ctx)?;
                if !left.is_allowed() {
                    return Ok(left);
                }
                b.before(ctx)
            }
            GuardRule::Or(a, b) => {
                let left = a.before(ctx)?;
                if left.is_allowed() {
                    return Ok(left);
                }
                let right = b.before(ctx)?;
                Ok(if right.is_allowed() { right } else { left })
            }
        }
    }

    fn after(&self, ctx: &PostExecutionContext<'_>) -> Result<GuardDecision, GuardFault> {
        match self {
            GuardRule::AllowAll
            | GuardRule::DenyAll
            | GuardRule::DenyOperation(_)
            | GuardRule::DenyTarget(_) => Ok(GuardDecision::allow()),
            GuardRule::RequireSuccess => {
                if ctx.success {
                    Ok(GuardDecision::allow())
                } else {
                    Ok(GuardDecision::deny(DenialReason::ExecutionFailed))
                }
            }
            GuardRule::GuardIntegrity => {
                let current = GuardRegistry::get_guard(&ctx.state, &ctx.wallet)
                    .map_err(|e| GuardFault::Failed(e.to_string()))?;
                let self_call = ctx.transaction.target == ctx.wallet
                    && ctx.transaction.operation == OperationKind::DirectCall;

                if current == Some(ctx.guard) || self_call {
                    Ok(GuardDecision::allow())
                } else {
                    Ok(GuardDecision::deny(DenialReason::GuardTampered))
                }
            }
            GuardRule::And(a, b) => {
                let left = a.after(ctx)?;
                if !left.is_allowed() {
                    return Ok(left);
                }
                b.after(ctx)
            }
            GuardRule::Or(a, b) => {
                let left = a.after(ctx)?;
                if left.is_allowed() {
                    return Ok(left);
                }
                let right = b.after(ctx)?;
                Ok(if right.is_allowed() { right } else { left })
            }
        }
    }
}

impl GuardPolicy for GuardRule {
    fn check_before_execution(
        &self,
        ctx: &PreExecutionContext<'_>,
    ) -> Result<GuardDecision, GuardFault> {
        self.before(ctx)
    }

    fn check_after_execution(
        &self,
        ctx: &PostExecutionContext<'_>,
    ) -> Result<GuardDecision, GuardFault> {
        self.after(ctx)
    }

    fn name(&self) -> &str {
        match self {
            GuardRule::AllowAll => "allow_all",
            GuardRule::DenyAll => "deny_all",
            GuardRule::DenyOperation(_) => "deny_operation",
            GuardRule::DenyTarget(_) => "deny_target",
            GuardRule::RequireSuccess => "require_success",
            GuardRule::GuardIntegrity => "guard_integrity",
            GuardRule::And(..) => "and",
            GuardRule::Or(..) => "or",
        }
    }
}
