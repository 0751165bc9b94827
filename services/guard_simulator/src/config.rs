//! Scenario configuration

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use wallet_guard::{transaction::hex_bytes, Address, ExecutorConfig, GuardRule, OperationKind};

/// Outcome a step is expected to have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expect {
    /// Finalized with a successful underlying call
    Success,
    /// Finalized with a failed underlying call
    Failure,
    /// Aborted by a guard denial
    Denied,
    /// Aborted for any other reason
    Aborted,
}

/// One quorum-signed attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Call {
        #[serde(default)]
        target: Address,
        #[serde(default)]
        value: u128,
        #[serde(default, with = "hex_bytes")]
        payload: Vec<u8>,
        operation: OperationKind,
        #[serde(default)]
        expect: Option<Expect>,
    },
    /// Wallet self-call replacing or clearing the guard
    SetGuard {
        #[serde(default)]
        guard: Option<Address>,
        #[serde(default)]
        expect: Option<Expect>,
    },
}

impl Step {
    pub fn expect(&self) -> Option<Expect> {
        match self {
            Step::Call { expect, .. } | Step::SetGuard { expect, .. } => *expect,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Number of fixture owner keys
    pub owners: u8,

    /// Signatures required per attempt
    pub threshold: usize,

    /// Guard installed at wallet setup
    #[serde(default)]
    pub guard: Option<GuardRule>,

    #[serde(default)]
    pub executor: ExecutorConfig,

    pub steps: Vec<Step>,
}

impl Default for Config {
    /// Single owner, reference guard: denied context-sharing call, allowed
    /// direct call, guard cleared, then the context-sharing call goes through
    fn default() -> Self {
        Self {
            owners: 1,
            threshold: 1,
            guard: Some(GuardRule::no_context_sharing()),
            executor: ExecutorConfig::default(),
            steps: vec![
                Step::Call {
                    target: Address::ZERO,
                    value: 0,
                    payload: Vec::new(),
                    operation: OperationKind::ContextSharingCall,
                    expect: Some(Expect::Denied),
                },
                Step::Call {
                    target: Address::ZERO,
                    value: 0,
                    payload: Vec::new(),
                    operation: OperationKind::DirectCall,
                    expect: Some(Expect::Success),
                },
                Step::SetGuard {
                    guard: None,
                    expect: Some(Expect::Success),
                },
                Step::Call {
                    target: Address::ZERO,
                    value: 0,
                    payload: Vec::new(),
                    operation: OperationKind::ContextSharingCall,
                    expect: Some(Expect::Success),
                },
            ],
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing scenario {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.owners > 0, "scenario needs at least one owner");
        ensure!(
            self.threshold > 0 && self.threshold <= usize::from(self.owners),
            "threshold {} is invalid for {} owners",
            self.threshold,
            self.owners
        );
        if let Some(rule) = &self.guard {
            rule.validate()?;
        }
        self.executor.validate()?;
        Ok(())
    }
}
