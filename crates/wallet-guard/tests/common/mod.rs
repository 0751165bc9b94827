#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use std::sync::{Arc, Mutex};
use wallet_guard::{
    Address, CallError, CallFrame, CallTarget, ExecutionError, ExecutionReceipt, ExecutorConfig,
    GuardDecision, GuardFault, GuardPolicy, GuardRule, Ledger, OperationKind, OwnerSet,
    OwnerSignature, PostExecutionContext, PreExecutionContext, ProposedTransaction, QuorumVerifier,
    TransactionExecutor, WalletCall, GUARD_STORAGE_KEY,
};

pub const COUNTER_KEY: &[u8] = b"count";

pub struct TestContext {
    pub ledger: Ledger,
    pub executor: TransactionExecutor,
    pub wallet: Address,
    /// Owner keys, ascending by owner address
    pub owners: Vec<SigningKey>,
    pub threshold: usize,
    pub relayer: Address,
}

impl TestContext {
    /// Threshold-1 wallet with a single owner and no guard
    pub fn new() -> Self {
        Self::with_owners(1, 1, ExecutorConfig::default())
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        Self::with_owners(1, 1, config)
    }

    pub fn with_owners(count: u8, threshold: usize, config: ExecutorConfig) -> Self {
        let mut owners: Vec<SigningKey> = (1..=count)
            .map(|seed| SigningKey::from_bytes(&[seed; 32]))
            .collect();
        owners.sort_by_key(|key| Address::from_verifying_key(&key.verifying_key()));

        let verifier = OwnerSet::new(owners.iter().map(SigningKey::verifying_key), threshold)
            .expect("valid owner set");
        let mut ctx = Self::with_verifier(Arc::new(verifier), config);
        ctx.owners = owners;
        ctx.threshold = threshold;
        ctx
    }

    pub fn with_verifier(verifier: Arc<dyn QuorumVerifier>, config: ExecutorConfig) -> Self {
        let wallet = Address::derive("wallet");
        let mut ledger = Ledger::new();
        let threshold = verifier.threshold();
        ledger
            .create_wallet(wallet, verifier, None)
            .expect("wallet created");

        Self {
            ledger,
            executor: TransactionExecutor::new(config),
            wallet,
            owners: Vec::new(),
            threshold,
            relayer: Address::derive("relayer"),
        }
    }

    /// Single-owner wallet guarded by the reference no-context-sharing policy
    pub fn guarded() -> Self {
        let mut ctx = Self::new();
        let guard = ctx.deploy_guard("no-context-sharing", Arc::new(GuardRule::no_context_sharing()));
        ctx.install_guard(guard);
        ctx
    }

    pub fn deploy_guard(&mut self, label: &str, policy: Arc<dyn GuardPolicy>) -> Address {
        let address = Address::derive(label);
        self.ledger
            .deploy_guard(address, policy)
            .expect("guard deployed");
        address
    }

    pub fn deploy_target(&mut self, label: &str, target: Arc<dyn CallTarget>) -> Address {
        let address = Address::derive(label);
        self.ledger
            .deploy_target(address, target)
            .expect("target deployed");
        address
    }

    /// Install a guard through the regular quorum-signed self-call
    pub fn install_guard(&mut self, guard: Address) {
        let tx = self.set_guard_tx(Some(guard));
        self.exec(&tx).expect("guard installed");
        assert_eq!(self.ledger.active_guard(&self.wallet), Ok(Some(guard)));
    }

    pub fn set_guard_tx(&self, guard: Option<Address>) -> ProposedTransaction {
        let payload = WalletCall::set_guard(guard).encode().expect("encodes");
        ProposedTransaction::new(self.wallet, 0, payload, OperationKind::DirectCall)
    }

    /// Signatures from the first `threshold` owners at the current nonce
    pub fn sign(&self, tx: &ProposedTransaction) -> Vec<OwnerSignature> {
        let hash = self
            .ledger
            .transaction_hash(&self.wallet, tx)
            .expect("nonce readable");
        self.owners
            .iter()
            .take(self.threshold)
            .map(|key| OwnerSignature::sign(key, &hash))
            .collect()
    }

    pub fn exec(&mut self, tx: &ProposedTransaction) -> Result<ExecutionReceipt, ExecutionError> {
        let signatures = self.sign(tx);
        self.exec_with(tx, &signatures)
    }

    pub fn exec_with(
        &mut self,
        tx: &ProposedTransaction,
        signatures: &[OwnerSignature],
    ) -> Result<ExecutionReceipt, ExecutionError> {
        self.executor
            .execute(&mut self.ledger, self.wallet, tx, signatures, self.relayer)
    }

    pub fn nonce(&self) -> u64 {
        self.ledger.nonce(&self.wallet).expect("nonce readable")
    }

    pub fn counter(&self, owner: &Address) -> u8 {
        self.ledger
            .state()
            .load(owner, COUNTER_KEY)
            .and_then(|raw| raw.first().copied())
            .unwrap_or(0)
    }
}

// ================================
// Test Contracts
// ================================

/// Increments a counter in the storage of the frame's context
pub struct Counter;

impl CallTarget for Counter {
    fn invoke(&self, frame: &mut CallFrame<'_>) -> Result<Vec<u8>, CallError> {
        let current = frame
            .load(COUNTER_KEY)
            .and_then(|raw| raw.first().copied())
            .unwrap_or(0);
        frame.store(COUNTER_KEY, vec![current + 1]);
        Ok(vec![current + 1])
    }
}

/// Writes before failing, so rollback of its own effects is observable
pub struct Reverter;

impl CallTarget for Reverter {
    fn invoke(&self, frame: &mut CallFrame<'_>) -> Result<Vec<u8>, CallError> {
        frame.store(COUNTER_KEY, vec![99]);
        Err(CallError::Reverted("reverter always fails".to_string()))
    }
}

/// Writes, then panics mid-call
pub struct Panicker;

impl CallTarget for Panicker {
    fn invoke(&self, frame: &mut CallFrame<'_>) -> Result<Vec<u8>, CallError> {
        frame.store(COUNTER_KEY, vec![77]);
        panic!("callee bug");
    }
}

/// Rewrites the guard slot of whatever context it runs in
///
/// An empty payload clears the slot; otherwise the payload is written verbatim.
pub struct GuardWiper;

impl CallTarget for GuardWiper {
    fn invoke(&self, frame: &mut CallFrame<'_>) -> Result<Vec<u8>, CallError> {
        if frame.payload().is_empty() {
            frame.remove(GUARD_STORAGE_KEY);
        } else {
            let payload = frame.payload().to_vec();
            frame.store(GUARD_STORAGE_KEY, payload);
        }
        Ok(Vec::new())
    }
}

/// Issues one fixed nested call from its frame
pub struct Relay {
    pub target: Address,
    pub payload: Vec<u8>,
    pub operation: OperationKind,
}

impl CallTarget for Relay {
    fn invoke(&self, frame: &mut CallFrame<'_>) -> Result<Vec<u8>, CallError> {
        frame.call(self.target, 0, self.payload.clone(), self.operation)
    }
}

// ================================
// Test Guards
// ================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Before {
        operation: OperationKind,
        signers: Vec<Address>,
        executor: Address,
    },
    After {
        success: bool,
        guard: Address,
    },
}

/// Allows everything before execution, records every checkpoint and can be
/// told to deny after execution
pub struct RecordingGuard {
    pub seen: Mutex<Vec<Seen>>,
    deny_after: bool,
}

impl RecordingGuard {
    pub fn allowing() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            deny_after: false,
        })
    }

    pub fn denying_after() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            deny_after: true,
        })
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().expect("lock").clone()
    }
}

impl GuardPolicy for RecordingGuard {
    fn check_before_execution(
        &self,
        ctx: &PreExecutionContext<'_>,
    ) -> Result<GuardDecision, GuardFault> {
        self.seen.lock().expect("lock").push(Seen::Before {
            operation: ctx.transaction.operation,
            signers: ctx.signers.to_vec(),
            executor: ctx.executor,
        });
        Ok(GuardDecision::allow())
    }

    fn check_after_execution(
        &self,
        ctx: &PostExecutionContext<'_>,
    ) -> Result<GuardDecision, GuardFault> {
        self.seen.lock().expect("lock").push(Seen::After {
            success: ctx.success,
            guard: ctx.guard,
        });
        if self.deny_after {
            Ok(GuardDecision::deny(wallet_guard::DenialReason::Custom {
                code: 1,
                message: "post-condition violated".to_string(),
            }))
        } else {
            Ok(GuardDecision::allow())
        }
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Panics in the pre-execution checkpoint
pub struct PanickingGuard;

impl GuardPolicy for PanickingGuard {
    fn check_before_execution(
        &self,
        _ctx: &PreExecutionContext<'_>,
    ) -> Result<GuardDecision, GuardFault> {
        panic!("guard bug");
    }
}

/// Errors in the post-execution checkpoint
pub struct FaultingGuard;

impl GuardPolicy for FaultingGuard {
    fn check_before_execution(
        &self,
        _ctx: &PreExecutionContext<'_>,
    ) -> Result<GuardDecision, GuardFault> {
        Ok(GuardDecision::allow())
    }

    fn check_after_execution(
        &self,
        _ctx: &PostExecutionContext<'_>,
    ) -> Result<GuardDecision, GuardFault> {
        Err(GuardFault::Failed("invariant oracle unavailable".to_string()))
    }
}
