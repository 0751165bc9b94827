//! Wallet Guard
//!
//! Fail-closed transaction guards for a multisignature wallet executor. Every
//! quorum-signed transaction passes a pre-execution and a post-execution guard
//! checkpoint; a denial or a guard fault at either one aborts the attempt and
//! reverts all of its effects.

// ================================
// Module Declarations
// ================================

// Core value types
pub mod address;
pub mod operation;
pub mod transaction;
pub mod events;

// Host environment: journaled storage, callee code and the ledger
pub mod state;
pub mod call;
pub mod ledger;
pub mod wallet;

// Guard policies and the checkpoint protocol
pub mod guards;
pub mod hooks;
pub mod registry;

// Signature verification and execution
pub mod signatures;
pub mod executor;

// Configuration and errors
pub mod config;
pub mod error;

// ================================
// Public API Re-exports
// ================================

pub use address::{Address, AddressParseError};
pub use operation::{OperationKind, UnknownOperation};
pub use transaction::{HashError, ProposedTransaction, TransactionHash};
pub use events::WalletEvent;

pub use state::{JournaledState, StateCheckpoint, StateError, StateView};
pub use call::{CallError, CallFrame, CallTarget};
pub use ledger::{Ledger, LedgerError, NONCE_STORAGE_KEY};
pub use wallet::WalletCall;

pub use guards::{
    DenialReason, GuardDecision, GuardFault, GuardPolicy, GuardRule, PostExecutionContext,
    PreExecutionContext, RuleError, MAX_GUARD_RULE_DEPTH,
};
pub use hooks::{ActiveGuard, GuardCheckpoint, GuardHookProtocol, GuardSnapshot, HookError};
pub use registry::{GuardRegistry, RegistryError, GUARD_STORAGE_KEY};

pub use signatures::{OwnerSet, OwnerSignature, QuorumVerifier, SignatureError};
pub use executor::{Attempt, AttemptState, ExecutionReceipt, TransactionExecutor};

pub use config::{ConfigError, ExecutorConfig};
pub use error::{ExecutionError, Result};
