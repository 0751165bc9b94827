//! Guard Simulator
//!
//! Replays JSON scenarios of quorum-signed wallet transactions through the
//! guarded executor and reports each attempt's outcome.

pub mod config;
pub mod simulator;

pub use config::{Config, Expect, Step};
pub use simulator::{Outcome, Report, Simulator, StepReport};

use anyhow::Result;
use tracing::info;

/// Run every step of a scenario in order
pub fn run(config: &Config) -> Result<Report> {
    let mut simulator = Simulator::new(config)?;

    let mut steps = Vec::with_capacity(config.steps.len());
    for (index, step) in config.steps.iter().enumerate() {
        steps.push(simulator.step(index, step)?);
    }

    let report = Report {
        wallet: simulator::scenario_wallet_address(),
        guard: simulator.active_guard()?,
        steps,
    };
    info!(
        steps = report.steps.len(),
        mismatches = report.mismatches(),
        "scenario complete"
    );
    Ok(report)
}
