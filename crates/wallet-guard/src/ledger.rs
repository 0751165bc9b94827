//! In-memory host ledger
//!
//! Holds journaled account storage, deployed call targets, wallets with their
//! quorum verifiers, and the guard registry. Every call dispatched through the
//! ledger runs under its own state checkpoint: a failing call reverts its own
//! effects and nothing else.

use crate::{
    address::Address,
    call::{CallError, CallFrame, CallTarget},
    events::WalletEvent,
    guards::{GuardFault, GuardPolicy, GuardRule, RuleError},
    hooks::{panic_message, GuardSnapshot},
    operation::OperationKind,
    registry::{GuardRegistry, RegistryError},
    signatures::QuorumVerifier,
    state::{JournaledState, StateError, StateView},
    transaction::{HashError, ProposedTransaction, TransactionHash},
    wallet::WalletCall,
};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Storage slot holding a wallet's nonce (u64, little endian)
pub const NONCE_STORAGE_KEY: &[u8] = b"wallet.nonce";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("address {0} is already in use")]
    AddressInUse(Address),

    #[error("{0} is not a wallet")]
    UnknownWallet(Address),

    #[error("invalid guard rule: {0}")]
    InvalidRule(#[from] RuleError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Hash(#[from] HashError),
}

// ================================
// Call Requests
// ================================

/// The frame a call is issued from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOrigin {
    /// Context address of the calling frame
    pub this: Address,
    /// Sender seen by the calling frame
    pub sender: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub origin: CallOrigin,
    pub target: Address,
    pub value: u128,
    pub payload: Vec<u8>,
    pub operation: OperationKind,
}

// ================================
// Ledger
// ================================

#[derive(Default)]
pub struct Ledger {
    state: JournaledState,
    targets: BTreeMap<Address, Arc<dyn CallTarget>>,
    wallets: BTreeMap<Address, Arc<dyn QuorumVerifier>>,
    guards: GuardRegistry,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_free(&self, address: Address) -> Result<(), LedgerError> {
        if address.is_zero()
            || self.targets.contains_key(&address)
            || self.wallets.contains_key(&address)
            || self.guards.is_deployed(&address)
        {
            return Err(LedgerError::AddressInUse(address));
        }
        Ok(())
    }

    /// Deploy callee code at `address`
    pub fn deploy_target(
        &mut self,
        address: Address,
        target: Arc<dyn CallTarget>,
    ) -> Result<(), LedgerError> {
        self.ensure_free(address)?;
        debug!(target = %address, name = target.name(), "call target deployed");
        self.targets.insert(address, target);
        Ok(())
    }

    pub fn deploy_guard(
        &mut self,
        address: Address,
        policy: Arc<dyn GuardPolicy>,
    ) -> Result<(), LedgerError> {
        self.ensure_free(address)?;
        self.guards.deploy(address, policy)?;
        Ok(())
    }

    /// Deploy a declarative rule after checking its nesting depth
    pub fn deploy_guard_rule(&mut self, address: Address, rule: GuardRule) -> Result<(), LedgerError> {
        rule.validate()?;
        self.deploy_guard(address, Arc::new(rule))
    }

    /// Register a wallet, optionally with an initial guard
    ///
    /// The initial guard is committed immediately, like a wallet setup call.
    pub fn create_wallet(
        &mut self,
        address: Address,
        verifier: Arc<dyn QuorumVerifier>,
        guard: Option<Address>,
    ) -> Result<(), LedgerError> {
        self.ensure_free(address)?;
        if let Some(guard) = guard {
            self.guards.set_guard(&mut self.state, address, Some(guard))?;
            self.state.commit();
        }
        info!(wallet = %address, threshold = verifier.threshold(), "wallet created");
        self.wallets.insert(address, verifier);
        Ok(())
    }

    // ================================
    // Accessors
    // ================================

    pub fn state(&self) -> &JournaledState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut JournaledState {
        &mut self.state
    }

    pub fn view(&self) -> StateView<'_> {
        self.state.view()
    }

    pub fn events(&self) -> &[WalletEvent] {
        self.state.events()
    }

    pub fn guards(&self) -> &GuardRegistry {
        &self.guards
    }

    pub fn is_wallet(&self, address: &Address) -> bool {
        self.wallets.contains_key(address)
    }

    pub fn verifier(&self, wallet: &Address) -> Result<Arc<dyn QuorumVerifier>, LedgerError> {
        self.wallets
            .get(wallet)
            .cloned()
            .ok_or(LedgerError::UnknownWallet(*wallet))
    }

    /// Next nonce of `wallet`; zero before its first finalized attempt
    pub fn nonce(&self, wallet: &Address) -> Result<u64, StateError> {
        Ok(self.view().load_u64(wallet, NONCE_STORAGE_KEY)?.unwrap_or(0))
    }

    pub(crate) fn set_nonce(&mut self, wallet: Address, nonce: u64) {
        self.state
            .store(wallet, NONCE_STORAGE_KEY, nonce.to_le_bytes().to_vec());
    }

    pub fn active_guard(&self, wallet: &Address) -> Result<Option<Address>, StateError> {
        GuardRegistry::get_guard(&self.view(), wallet)
    }

    pub(crate) fn snapshot_guard(&self, wallet: &Address) -> Result<GuardSnapshot, GuardFault> {
        self.guards.snapshot(&self.view(), wallet)
    }

    /// Hash owners must sign for `tx` at the wallet's current nonce
    pub fn transaction_hash(
        &self,
        wallet: &Address,
        tx: &ProposedTransaction,
    ) -> Result<TransactionHash, LedgerError> {
        Ok(tx.hash(wallet, self.nonce(wallet)?)?)
    }

    // ================================
    // Dispatch
    // ================================

    /// Run one call under its own checkpoint
    pub(crate) fn dispatch(
        &mut self,
        request: CallRequest,
        depth: usize,
        max_depth: usize,
    ) -> Result<Vec<u8>, CallError> {
        if depth > max_depth {
            return Err(CallError::DepthExceeded(depth));
        }

        let checkpoint = self.state.checkpoint();
        // A panicking callee fails its call; the revert below drops whatever it wrote
        let result = catch_unwind(AssertUnwindSafe(|| self.run(request, depth, max_depth)))
            .unwrap_or_else(|payload| Err(CallError::Panicked(panic_message(payload.as_ref()))));
        if result.is_err() {
            self.state.revert_to(checkpoint);
        }
        result
    }

    fn run(&mut self, request: CallRequest, depth: usize, max_depth: usize) -> Result<Vec<u8>, CallError> {
        let CallRequest {
            origin,
            target,
            value,
            payload,
            operation,
        } = request;

        let (sender, this) = if operation.shares_context() {
            (origin.sender, origin.this)
        } else {
            (origin.this, target)
        };
        trace!(%target, %sender, %this, %operation, depth, "dispatching call");

        if self.wallets.contains_key(&target) {
            return self.run_wallet_code(sender, this, &payload);
        }

        let Some(code) = self.targets.get(&target).cloned() else {
            // No code at the target: succeeds without effect
            return Ok(Vec::new());
        };

        let mut frame = CallFrame {
            ledger: self,
            sender,
            this,
            code: target,
            value,
            payload,
            depth,
            max_depth,
        };
        code.invoke(&mut frame)
    }

    /// Built-in wallet code: self-management calls only
    fn run_wallet_code(&mut self, sender: Address, this: Address, payload: &[u8]) -> Result<Vec<u8>, CallError> {
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        if sender != this {
            return Err(CallError::Unauthorized { sender });
        }

        match WalletCall::decode(payload).map_err(|e| CallError::InvalidPayload(e.to_string()))? {
            WalletCall::SetGuard { guard } => {
                self.guards.set_guard(&mut self.state, this, guard)?;
            }
        }
        Ok(Vec::new())
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("targets", &self.targets.keys().collect::<Vec<_>>())
            .field("wallets", &self.wallets.keys().collect::<Vec<_>>())
            .field("guards", &self.guards)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::OwnerSet;
    use ed25519_dalek::SigningKey;

    const MAX_DEPTH: usize = 8;

    struct Counter;

    impl CallTarget for Counter {
        fn invoke(&self, frame: &mut CallFrame<'_>) -> Result<Vec<u8>, CallError> {
            let current = frame
                .load(b"count")
                .and_then(|raw| raw.first().copied())
                .unwrap_or(0);
            frame.store(b"count", vec![current + 1]);
            Ok(frame.sender().as_bytes().to_vec())
        }
    }

    /// Writes to its own storage, then fails
    struct WriteThenRevert;

    impl CallTarget for WriteThenRevert {
        fn invoke(&self, frame: &mut CallFrame<'_>) -> Result<Vec<u8>, CallError> {
            frame.store(b"scratch", vec![1]);
            Err(CallError::Reverted("always".to_string()))
        }
    }

    /// Calls itself until the depth limit is hit
    struct Recursive;

    impl CallTarget for Recursive {
        fn invoke(&self, frame: &mut CallFrame<'_>) -> Result<Vec<u8>, CallError> {
            let code = frame.code();
            frame.call(code, 0, Vec::new(), OperationKind::DirectCall)
        }
    }

    fn verifier() -> Arc<dyn QuorumVerifier> {
        let key = SigningKey::from_bytes(&[1u8; 32]);
        Arc::new(OwnerSet::new([key.verifying_key()], 1).unwrap())
    }

    fn request(origin: Address, target: Address, payload: Vec<u8>, operation: OperationKind) -> CallRequest {
        CallRequest {
            origin: CallOrigin {
                this: origin,
                sender: Address::derive("executor"),
            },
            target,
            value: 0,
            payload,
            operation,
        }
    }

    #[test]
    fn test_direct_and_context_sharing_frames() {
        let wallet = Address::derive("wallet");
        let counter = Address::derive("counter");
        let mut ledger = Ledger::new();
        ledger.deploy_target(counter, Arc::new(Counter)).unwrap();

        let sender = ledger
            .dispatch(request(wallet, counter, Vec::new(), OperationKind::DirectCall), 0, MAX_DEPTH)
            .unwrap();
        assert_eq!(sender, wallet.as_bytes().to_vec());
        assert_eq!(ledger.state().load(&counter, b"count"), Some(&[1u8][..]));
        assert_eq!(ledger.state().load(&wallet, b"count"), None);

        let sender = ledger
            .dispatch(
                request(wallet, counter, Vec::new(), OperationKind::ContextSharingCall),
                0,
                MAX_DEPTH,
            )
            .unwrap();
        assert_eq!(sender, Address::derive("executor").as_bytes().to_vec());
        assert_eq!(ledger.state().load(&wallet, b"count"), Some(&[1u8][..]));
    }

    #[test]
    fn test_failed_call_reverts_own_writes() {
        let wallet = Address::derive("wallet");
        let target = Address::derive("reverter");
        let mut ledger = Ledger::new();
        ledger.deploy_target(target, Arc::new(WriteThenRevert)).unwrap();

        let result = ledger.dispatch(request(wallet, target, Vec::new(), OperationKind::DirectCall), 0, MAX_DEPTH);
        assert_eq!(result, Err(CallError::Reverted("always".to_string())));
        assert_eq!(ledger.state().load(&target, b"scratch"), None);
        assert_eq!(ledger.state().journal_len(), 0);
    }

    #[test]
    fn test_call_without_code_succeeds_empty() {
        let mut ledger = Ledger::new();
        let result = ledger.dispatch(
            request(Address::derive("wallet"), Address::ZERO, vec![1, 2, 3], OperationKind::ContextSharingCall),
            0,
            MAX_DEPTH,
        );
        assert_eq!(result, Ok(Vec::new()));
    }

    #[test]
    fn test_depth_limit() {
        let target = Address::derive("recursive");
        let mut ledger = Ledger::new();
        ledger.deploy_target(target, Arc::new(Recursive)).unwrap();

        let result = ledger.dispatch(request(Address::derive("wallet"), target, Vec::new(), OperationKind::DirectCall), 0, 3);
        assert_eq!(result, Err(CallError::DepthExceeded(4)));
    }

    #[test]
    fn test_wallet_self_call_requires_wallet_sender() {
        let wallet = Address::derive("wallet");
        let guard = Address::derive("guard");
        let mut ledger = Ledger::new();
        ledger.deploy_guard_rule(guard, GuardRule::AllowAll).unwrap();
        ledger.create_wallet(wallet, verifier(), None).unwrap();

        let payload = WalletCall::set_guard(Some(guard)).encode().unwrap();

        // Another account calling the wallet
        let outsider = Address::derive("outsider");
        let result = ledger.dispatch(request(outsider, wallet, payload.clone(), OperationKind::DirectCall), 0, MAX_DEPTH);
        assert_eq!(result, Err(CallError::Unauthorized { sender: outsider }));
        assert_eq!(ledger.active_guard(&wallet), Ok(None));

        // The wallet calling itself
        ledger
            .dispatch(request(wallet, wallet, payload, OperationKind::DirectCall), 0, MAX_DEPTH)
            .unwrap();
        assert_eq!(ledger.active_guard(&wallet), Ok(Some(guard)));
    }

    #[test]
    fn test_wallet_rejects_malformed_payload() {
        let wallet = Address::derive("wallet");
        let mut ledger = Ledger::new();
        ledger.create_wallet(wallet, verifier(), None).unwrap();

        let result = ledger.dispatch(request(wallet, wallet, vec![0xff], OperationKind::DirectCall), 0, MAX_DEPTH);
        assert!(matches!(result, Err(CallError::InvalidPayload(_))));

        // Empty payload is a plain no-op call
        assert_eq!(
            ledger.dispatch(request(wallet, wallet, Vec::new(), OperationKind::DirectCall), 0, MAX_DEPTH),
            Ok(Vec::new())
        );
    }

    #[test]
    fn test_address_collisions() {
        let address = Address::derive("taken");
        let mut ledger = Ledger::new();
        ledger.deploy_target(address, Arc::new(Counter)).unwrap();

        assert_eq!(
            ledger.deploy_guard_rule(address, GuardRule::AllowAll),
            Err(LedgerError::AddressInUse(address))
        );
        assert_eq!(
            ledger.create_wallet(address, verifier(), None),
            Err(LedgerError::AddressInUse(address))
        );
        assert_eq!(
            ledger.deploy_target(Address::ZERO, Arc::new(Counter)),
            Err(LedgerError::AddressInUse(Address::ZERO))
        );
    }

    #[test]
    fn test_create_wallet_with_guard() {
        let wallet = Address::derive("wallet");
        let guard = Address::derive("guard");
        let mut ledger = Ledger::new();
        ledger.deploy_guard_rule(guard, GuardRule::no_context_sharing()).unwrap();
        ledger.create_wallet(wallet, verifier(), Some(guard)).unwrap();

        assert_eq!(ledger.active_guard(&wallet), Ok(Some(guard)));
        assert_eq!(ledger.state().journal_len(), 0);
        assert_eq!(ledger.nonce(&wallet), Ok(0));
        assert!(matches!(
            ledger.verifier(&Address::derive("nobody")),
            Err(LedgerError::UnknownWallet(_))
        ));
    }
}
