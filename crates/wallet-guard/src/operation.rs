//! Operation kinds a wallet transaction can request

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How the underlying call is executed
///
/// `DirectCall` runs the callee in its own context. `ContextSharingCall` runs the
/// callee's code against the caller's storage and identity, which is why guards
/// commonly forbid it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
#[repr(u8)]
pub enum OperationKind {
    DirectCall = 0,
    ContextSharingCall = 1,
}

impl OperationKind {
    pub const ALL: [OperationKind; 2] = [Self::DirectCall, Self::ContextSharingCall];

    /// Numeric wire code
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn shares_context(self) -> bool {
        matches!(self, Self::ContextSharingCall)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::DirectCall => write!(f, "direct_call"),
            OperationKind::ContextSharingCall => write!(f, "context_sharing_call"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown operation code {0}")]
pub struct UnknownOperation(pub u8);

impl TryFrom<u8> for OperationKind {
    type Error = UnknownOperation;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::DirectCall),
            1 => Ok(Self::ContextSharingCall),
            other => Err(UnknownOperation(other)),
        }
    }
}
