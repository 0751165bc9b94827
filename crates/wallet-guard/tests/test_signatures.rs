mod common;

use common::{PanickingGuard, RecordingGuard, Seen, TestContext};
use ed25519_dalek::SigningKey;
use mockall::mock;
use std::sync::Arc;
use wallet_guard::{
    Address, ExecutionError, ExecutorConfig, Ledger, OperationKind, OwnerSignature,
    ProposedTransaction, QuorumVerifier, SignatureError, TransactionExecutor, TransactionHash,
};

mock! {
    pub Verifier {}

    impl QuorumVerifier for Verifier {
        fn threshold(&self) -> usize;
        fn verify(
            &self,
            tx_hash: &TransactionHash,
            signatures: &[OwnerSignature],
        ) -> Result<Vec<Address>, SignatureError>;
    }
}

fn mocked(verifier: MockVerifier) -> TestContext {
    TestContext::with_verifier(Arc::new(verifier), ExecutorConfig::default())
}

#[test]
fn test_signature_failure_precedes_guard() {
    let mut verifier = MockVerifier::new();
    verifier.expect_threshold().return_const(2usize);
    verifier
        .expect_verify()
        .times(1)
        .returning(|_, _| Err(SignatureError::InsufficientSignatures { required: 2, provided: 0 }));

    // Would fault if it were ever consulted
    let wallet = Address::derive("wallet");
    let guard = Address::derive("panicking");
    let mut ledger = Ledger::new();
    ledger.deploy_guard(guard, Arc::new(PanickingGuard)).unwrap();
    ledger.create_wallet(wallet, Arc::new(verifier), Some(guard)).unwrap();

    let tx = ProposedTransaction::call(wallet, OperationKind::DirectCall);
    let err = TransactionExecutor::default()
        .execute(&mut ledger, wallet, &tx, &[], Address::derive("relayer"))
        .unwrap_err();
    assert_eq!(
        err,
        ExecutionError::Signature(SignatureError::InsufficientSignatures { required: 2, provided: 0 })
    );
    assert_eq!(ledger.nonce(&wallet), Ok(0));
}

#[test]
fn test_verified_signers_reach_guard() {
    let signers = vec![Address::derive("alice"), Address::derive("bob")];
    let expected = signers.clone();

    let mut verifier = MockVerifier::new();
    verifier.expect_threshold().return_const(2usize);
    verifier
        .expect_verify()
        .returning(move |_, _| Ok(signers.clone()));

    let mut ctx = mocked(verifier);
    let recording = RecordingGuard::allowing();
    let guard = ctx.deploy_guard("recording", recording.clone());
    ctx.install_guard(guard);

    let receipt = ctx
        .exec_with(&ProposedTransaction::call(Address::ZERO, OperationKind::DirectCall), &[])
        .unwrap();

    assert_eq!(receipt.signers, expected);
    assert_eq!(
        recording.seen().first(),
        Some(&Seen::Before {
            operation: OperationKind::DirectCall,
            signers: expected,
            executor: ctx.relayer,
        })
    );
}

#[test]
fn test_verifier_sees_hash_at_current_nonce() {
    let wallet = Address::derive("wallet");
    let tx = ProposedTransaction::call(Address::ZERO, OperationKind::DirectCall);
    let first = tx.hash(&wallet, 0).unwrap();
    let second = tx.hash(&wallet, 1).unwrap();

    let mut verifier = MockVerifier::new();
    verifier.expect_threshold().return_const(1usize);
    verifier
        .expect_verify()
        .withf(move |hash, _| *hash == first)
        .times(1)
        .returning(|_, _| Ok(vec![Address::derive("alice")]));
    verifier
        .expect_verify()
        .withf(move |hash, _| *hash == second)
        .times(1)
        .returning(|_, _| Ok(vec![Address::derive("alice")]));

    let mut ctx = mocked(verifier);
    assert_eq!(ctx.exec_with(&tx, &[]).unwrap().nonce, 0);
    assert_eq!(ctx.exec_with(&tx, &[]).unwrap().nonce, 1);
}

// ================================
// Stock owner set through the executor
// ================================

#[test]
fn test_two_of_three_quorum() {
    let mut ctx = TestContext::with_owners(3, 2, ExecutorConfig::default());
    let tx = ProposedTransaction::call(Address::ZERO, OperationKind::DirectCall);

    let receipt = ctx.exec(&tx).unwrap();
    assert_eq!(receipt.signers.len(), 2);
    assert!(receipt.signers[0] < receipt.signers[1]);
}

#[test]
fn test_owner_set_errors_surface_unchanged() {
    let mut ctx = TestContext::with_owners(3, 2, ExecutorConfig::default());
    let recording = RecordingGuard::allowing();
    let guard = ctx.deploy_guard("recording", recording.clone());
    ctx.install_guard(guard);
    let checks = recording.seen().len();
    let nonce = ctx.nonce();

    let tx = ProposedTransaction::call(Address::ZERO, OperationKind::ContextSharingCall);
    let mut signatures = ctx.sign(&tx);

    // One short
    let err = ctx.exec_with(&tx, &signatures[..1]).unwrap_err();
    assert_eq!(
        err,
        ExecutionError::Signature(SignatureError::InsufficientSignatures { required: 2, provided: 1 })
    );

    // Wrong order
    signatures.reverse();
    let err = ctx.exec_with(&tx, &signatures).unwrap_err();
    assert_eq!(err, ExecutionError::Signature(SignatureError::SignersNotSorted));

    // Outsider key
    let outsider = SigningKey::from_bytes(&[200u8; 32]);
    let hash = ctx.ledger.transaction_hash(&ctx.wallet, &tx).unwrap();
    let mut forged = vec![OwnerSignature::sign(&outsider, &hash), ctx.sign(&tx)[0].clone()];
    forged.sort_by_key(|signature| signature.owner);
    let err = ctx.exec_with(&tx, &forged).unwrap_err();
    assert!(matches!(err, ExecutionError::Signature(SignatureError::UnknownSigner(_))));

    // None of these reached the guard or consumed the nonce
    assert_eq!(recording.seen().len(), checks);
    assert_eq!(ctx.nonce(), nonce);
}

#[test]
fn test_signatures_bound_to_transaction() {
    let mut ctx = TestContext::new();
    let tx = ProposedTransaction::call(Address::ZERO, OperationKind::DirectCall);
    let other = ProposedTransaction::new(Address::ZERO, 1, Vec::new(), OperationKind::DirectCall);

    let signatures = ctx.sign(&other);
    let err = ctx.exec_with(&tx, &signatures).unwrap_err();
    assert!(matches!(err, ExecutionError::Signature(SignatureError::InvalidSignature(_))));
}

#[test]
fn test_wrong_wallet_hash_rejected() {
    let mut ctx = TestContext::new();
    let tx = ProposedTransaction::call(Address::ZERO, OperationKind::DirectCall);
    let foreign: TransactionHash = tx.hash(&Address::derive("other-wallet"), 0).unwrap();
    let signatures = vec![OwnerSignature::sign(&ctx.owners[0], &foreign)];

    assert!(matches!(
        ctx.exec_with(&tx, &signatures),
        Err(ExecutionError::Signature(SignatureError::InvalidSignature(_)))
    ));
}
