// Guarded transaction executor
//
// One call to `execute` is one attempt:
//
//   Proposed -> SignaturesVerified -> GuardPreChecked -> Executed
//            -> GuardPostChecked -> Finalized
//
// with `Aborted` reachable from every non-terminal state. The attempt runs
// under a single ledger checkpoint. Finalizing commits the journal; aborting
// reverts to the checkpoint, which discards the consumed nonce, the effects of
// the underlying call and any events it emitted. Earlier attempts are already
// committed and never touched.

use crate::{
    address::Address,
    config::ExecutorConfig,
    error::{ExecutionError, Result},
    events::WalletEvent,
    guards::{GuardFault, PostExecutionContext, PreExecutionContext},
    hooks::{GuardCheckpoint, GuardHookProtocol, GuardSnapshot, HookError},
    ledger::{CallOrigin, CallRequest, Ledger, LedgerError},
    signatures::OwnerSignature,
    transaction::{hex_bytes, ProposedTransaction, TransactionHash},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

// ================================
// Attempt State Machine
// ================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttemptState {
    Proposed,
    SignaturesVerified,
    GuardPreChecked,
    Executed,
    GuardPostChecked,
    Finalized,
    Aborted,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Finalized | AttemptState::Aborted)
    }

    /// Forward moves follow the attempt pipeline one step at a time. `Aborted` is
    /// reachable from every live state, `Executed` included, since a post-check
    /// denial or a failed call aborts after the call has run.
    pub fn can_transition_to(self, next: AttemptState) -> bool {
        match (self, next) {
            (AttemptState::Proposed, AttemptState::SignaturesVerified)
            | (AttemptState::SignaturesVerified, AttemptState::GuardPreChecked)
            | (AttemptState::GuardPreChecked, AttemptState::Executed)
            | (AttemptState::Executed, AttemptState::GuardPostChecked)
            | (AttemptState::GuardPostChecked, AttemptState::Finalized) => true,
            (from, AttemptState::Aborted) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptState::Proposed => "proposed",
            AttemptState::SignaturesVerified => "signatures_verified",
            AttemptState::GuardPreChecked => "guard_pre_checked",
            AttemptState::Executed => "executed",
            AttemptState::GuardPostChecked => "guard_post_checked",
            AttemptState::Finalized => "finalized",
            AttemptState::Aborted => "aborted",
        };
        write!(f, "{name}")
    }
}

/// Progress of a single attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    trace: Vec<AttemptState>,
}

impl Default for Attempt {
    fn default() -> Self {
        Self::new()
    }
}

impl Attempt {
    pub fn new() -> Self {
        Self {
            trace: vec![AttemptState::Proposed],
        }
    }

    pub fn state(&self) -> AttemptState {
        self.trace.last().copied().unwrap_or(AttemptState::Proposed)
    }

    /// Every state visited so far, in order
    pub fn trace(&self) -> &[AttemptState] {
        &self.trace
    }

    pub fn advance(&mut self, next: AttemptState) -> Result<()> {
        let from = self.state();
        if !from.can_transition_to(next) {
            return Err(ExecutionError::InvalidTransition { from, to: next });
        }
        self.trace.push(next);
        Ok(())
    }

    /// Move to `Aborted` unless the attempt already ended
    pub fn abort(&mut self) {
        if !self.state().is_terminal() {
            self.trace.push(AttemptState::Aborted);
        }
    }
}

// ================================
// Receipts
// ================================

/// Outcome of a finalized attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReceipt {
    pub wallet: Address,
    pub tx_hash: TransactionHash,
    /// Nonce the transaction was signed at
    pub nonce: u64,
    /// Whether the underlying call succeeded
    pub success: bool,
    #[serde(serialize_with = "hex_bytes::serialize")]
    pub return_data: Vec<u8>,
    /// Verified signers, ascending by address
    pub signers: Vec<Address>,
    /// Guard snapshotted at attempt start
    pub guard: Option<Address>,
    pub trace: Vec<AttemptState>,
}

// ================================
// Executor
// ================================

#[derive(Debug, Clone, Default)]
pub struct TransactionExecutor {
    config: ExecutorConfig,
}

impl TransactionExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run one guarded attempt of `tx` on `wallet`
    ///
    /// `executor` is the account submitting the attempt. It is passed to the
    /// pre-execution guard and is the sender seen by context-sharing callees.
    pub fn execute(
        &self,
        ledger: &mut Ledger,
        wallet: Address,
        tx: &ProposedTransaction,
        signatures: &[OwnerSignature],
        executor: Address,
    ) -> Result<ExecutionReceipt> {
        if tx.payload.len() > self.config.max_payload_size {
            return Err(ExecutionError::PayloadTooLarge {
                size: tx.payload.len(),
                max: self.config.max_payload_size,
            });
        }

        let checkpoint = ledger.state().checkpoint();
        let mut attempt = Attempt::new();

        match self.run_attempt(ledger, &mut attempt, wallet, tx, signatures, executor) {
            Ok(receipt) => {
                ledger.state_mut().commit();
                info!(
                    wallet = %wallet,
                    tx_hash = %receipt.tx_hash,
                    nonce = receipt.nonce,
                    success = receipt.success,
                    "transaction finalized"
                );
                Ok(receipt)
            }
            Err(err) => {
                ledger.state_mut().revert_to(checkpoint);
                let at = attempt.state();
                attempt.abort();
                warn!(wallet = %wallet, state = %at, error = %err, "attempt aborted");
                Err(err)
            }
        }
    }

    fn run_attempt(
        &self,
        ledger: &mut Ledger,
        attempt: &mut Attempt,
        wallet: Address,
        tx: &ProposedTransaction,
        signatures: &[OwnerSignature],
        executor: Address,
    ) -> Result<ExecutionReceipt> {
        // Signatures
        let verifier = ledger.verifier(&wallet)?;
        let nonce = ledger.nonce(&wallet)?;
        let tx_hash = tx.hash(&wallet, nonce).map_err(LedgerError::from)?;
        let signers = verifier.verify(&tx_hash, signatures)?;
        ledger.set_nonce(wallet, nonce + 1);
        attempt.advance(AttemptState::SignaturesVerified)?;
        debug!(wallet = %wallet, tx_hash = %tx_hash, nonce, "signatures verified");

        // Pre-execution checkpoint against a snapshot taken now
        let snapshot = ledger
            .snapshot_guard(&wallet)
            .map_err(|source| snapshot_fault(source, GuardCheckpoint::PreExecution))?;
        {
            let ctx = PreExecutionContext {
                wallet,
                transaction: tx,
                tx_hash,
                nonce,
                signers: &signers,
                executor,
                state: ledger.view(),
            };
            GuardHookProtocol::pre_check(&snapshot, &ctx)?;
        }
        attempt.advance(AttemptState::GuardPreChecked)?;

        // Underlying call
        let outcome = ledger.dispatch(
            CallRequest {
                origin: CallOrigin {
                    this: wallet,
                    sender: executor,
                },
                target: tx.target,
                value: tx.value,
                payload: tx.payload.clone(),
                operation: tx.operation,
            },
            0,
            self.config.max_call_depth,
        );
        let success = outcome.is_ok();
        attempt.advance(AttemptState::Executed)?;
        debug!(wallet = %wallet, tx_hash = %tx_hash, success, "underlying call returned");

        // Post-execution checkpoint with the same snapshot
        Self::post_check(ledger, &snapshot, wallet, tx, tx_hash, success)?;
        attempt.advance(AttemptState::GuardPostChecked)?;

        let return_data = match outcome {
            Ok(data) => {
                ledger
                    .state_mut()
                    .emit(WalletEvent::ExecutionSuccess { wallet, tx_hash });
                data
            }
            Err(err) if self.config.revert_on_call_failure => {
                return Err(ExecutionError::CallFailed(err));
            }
            Err(err) => {
                debug!(wallet = %wallet, tx_hash = %tx_hash, error = %err, "keeping failed call");
                ledger
                    .state_mut()
                    .emit(WalletEvent::ExecutionFailure { wallet, tx_hash });
                Vec::new()
            }
        };
        attempt.advance(AttemptState::Finalized)?;

        Ok(ExecutionReceipt {
            wallet,
            tx_hash,
            nonce,
            success,
            return_data,
            signers,
            guard: snapshot.guard_address(),
            trace: attempt.trace().to_vec(),
        })
    }

    fn post_check(
        ledger: &Ledger,
        snapshot: &GuardSnapshot,
        wallet: Address,
        tx: &ProposedTransaction,
        tx_hash: TransactionHash,
        success: bool,
    ) -> Result<()> {
        let Some(guard) = snapshot.guard_address() else {
            return Ok(());
        };
        let ctx = PostExecutionContext {
            wallet,
            transaction: tx,
            tx_hash,
            success,
            guard,
            state: ledger.view(),
        };
        GuardHookProtocol::post_check(snapshot, &ctx)?;
        Ok(())
    }
}

/// A guard that cannot be resolved is a fault attributed to its address
fn snapshot_fault(source: GuardFault, checkpoint: GuardCheckpoint) -> HookError {
    let guard = match &source {
        GuardFault::Unresolved(address) => *address,
        _ => Address::ZERO,
    };
    HookError::Fault {
        guard,
        checkpoint,
        source,
    }
}
