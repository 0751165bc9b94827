//! Guard simulator binary

use anyhow::{bail, Result};
use clap::Parser;
use guard_simulator::{run, Config, Outcome};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file; the built-in single-owner scenario runs when omitted
    scenario: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.scenario {
        Some(path) => Config::from_file(path)?,
        None => {
            info!("no scenario given, running the built-in single-owner scenario");
            Config::default()
        }
    };

    let report = run(&config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Wallet: {}", report.wallet);
        for step in &report.steps {
            let outcome = match &step.outcome {
                Outcome::Finalized { success: true, tx_hash } => format!("finalized {tx_hash}"),
                Outcome::Finalized { success: false, tx_hash } => {
                    format!("finalized with failed call {tx_hash}")
                }
                Outcome::Denied { reason } => format!("denied: {reason}"),
                Outcome::Aborted { error } => format!("aborted: {error}"),
            };
            let marker = match step.as_expected {
                Some(true) => "ok",
                Some(false) => "MISMATCH",
                None => "-",
            };
            println!("  [{marker:>8}] step {}: {outcome}", step.index);
        }
        match report.guard {
            Some(guard) => println!("Active guard: {guard}"),
            None => println!("Active guard: none"),
        }
    }

    let mismatches = report.mismatches();
    if mismatches > 0 {
        bail!("{mismatches} step(s) did not match their expectation");
    }
    Ok(())
}
