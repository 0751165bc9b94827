//! Scenario replay against an in-memory ledger

use crate::config::{Config, Expect, Step};
use anyhow::{Context, Result};
use ed25519_dalek::SigningKey;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wallet_guard::{
    Address, ExecutionError, ExecutionReceipt, Ledger, OperationKind, OwnerSet, OwnerSignature,
    ProposedTransaction, TransactionExecutor, TransactionHash, WalletCall,
};

/// Address the scenario guard is deployed at
pub fn scenario_guard_address() -> Address {
    Address::derive("guard-simulator/guard")
}

pub fn scenario_wallet_address() -> Address {
    Address::derive("guard-simulator/wallet")
}

fn relayer_address() -> Address {
    Address::derive("guard-simulator/relayer")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Finalized { success: bool, tx_hash: TransactionHash },
    Denied { reason: String },
    Aborted { error: String },
}

impl Outcome {
    fn from_result(result: std::result::Result<ExecutionReceipt, ExecutionError>) -> Self {
        match result {
            Ok(receipt) => Outcome::Finalized {
                success: receipt.success,
                tx_hash: receipt.tx_hash,
            },
            Err(err) => match err.denial_reason() {
                Some(reason) => Outcome::Denied {
                    reason: reason.to_string(),
                },
                None => Outcome::Aborted {
                    error: err.to_string(),
                },
            },
        }
    }

    pub fn matches(&self, expect: Expect) -> bool {
        matches!(
            (self, expect),
            (Outcome::Finalized { success: true, .. }, Expect::Success)
                | (Outcome::Finalized { success: false, .. }, Expect::Failure)
                | (Outcome::Denied { .. }, Expect::Denied)
                | (Outcome::Aborted { .. }, Expect::Aborted)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub step: Step,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// `None` when the step carried no expectation
    pub as_expected: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub wallet: Address,
    pub guard: Option<Address>,
    pub steps: Vec<StepReport>,
}

impl Report {
    pub fn mismatches(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.as_expected == Some(false))
            .count()
    }
}

/// Wallet fixture driven by a scenario
pub struct Simulator {
    ledger: Ledger,
    executor: TransactionExecutor,
    owners: Vec<SigningKey>,
    threshold: usize,
    wallet: Address,
}

impl Simulator {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut owners: Vec<SigningKey> = (1..=config.owners)
            .map(|seed| SigningKey::from_bytes(&[seed; 32]))
            .collect();
        owners.sort_by_key(|key| Address::from_verifying_key(&key.verifying_key()));
        let verifier = OwnerSet::new(owners.iter().map(SigningKey::verifying_key), config.threshold)?;

        let mut ledger = Ledger::new();
        let guard = match &config.guard {
            Some(rule) => {
                let address = scenario_guard_address();
                ledger.deploy_guard_rule(address, rule.clone())?;
                Some(address)
            }
            None => None,
        };

        let wallet = scenario_wallet_address();
        ledger.create_wallet(wallet, Arc::new(verifier), guard)?;
        info!(wallet = %wallet, guard = ?guard, owners = owners.len(), "scenario wallet ready");

        Ok(Self {
            ledger,
            executor: TransactionExecutor::new(config.executor.clone()),
            owners,
            threshold: config.threshold,
            wallet,
        })
    }

    fn transaction(&self, step: &Step) -> Result<ProposedTransaction> {
        Ok(match step {
            Step::Call {
                target,
                value,
                payload,
                operation,
                ..
            } => ProposedTransaction::new(*target, *value, payload.clone(), *operation),
            Step::SetGuard { guard, .. } => {
                let payload = WalletCall::set_guard(*guard)
                    .encode()
                    .context("encoding set_guard payload")?;
                ProposedTransaction::new(self.wallet, 0, payload, OperationKind::DirectCall)
            }
        })
    }

    fn sign(&self, tx: &ProposedTransaction) -> Result<Vec<OwnerSignature>> {
        let hash = self.ledger.transaction_hash(&self.wallet, tx)?;
        Ok(self
            .owners
            .iter()
            .take(self.threshold)
            .map(|key| OwnerSignature::sign(key, &hash))
            .collect())
    }

    /// Run one step as a full quorum-signed attempt
    pub fn step(&mut self, index: usize, step: &Step) -> Result<StepReport> {
        let tx = self.transaction(step)?;
        let signatures = self.sign(&tx)?;
        debug!(index, target = %tx.target, operation = %tx.operation, "running step");

        let result = self.executor.execute(
            &mut self.ledger,
            self.wallet,
            &tx,
            &signatures,
            relayer_address(),
        );
        let outcome = Outcome::from_result(result);
        let as_expected = step.expect().map(|expect| outcome.matches(expect));

        if as_expected == Some(false) {
            warn!(index, ?outcome, expected = ?step.expect(), "step did not match expectation");
        }

        Ok(StepReport {
            index,
            step: step.clone(),
            outcome,
            as_expected,
        })
    }

    pub fn active_guard(&self) -> Result<Option<Address>> {
        Ok(self.ledger.active_guard(&self.wallet)?)
    }
}
