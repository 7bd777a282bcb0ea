//! Oracle direction cross-check
//!
//! Replays reference-source samples against the Pyth Hermes price history and
//! reports the share of windows where both agree on direction.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use polymarket_ops::services::{load_records, HermesClient, OracleComparator, Progress};
use polymarket_ops::CompareConfig;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "oracle-compare")]
#[command(about = "Cross-check reference candle directions against oracle prices")]
#[command(version)]
struct Cli {
    /// Samples file: JSON array of {ts, bo, bc, bd, bf}
    #[arg(short, long)]
    samples: Option<String>,

    /// Report file, overwritten at the end of the run
    #[arg(short, long)]
    report: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the report lines
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut config = CompareConfig::from_env()?;
    if let Some(samples) = cli.samples {
        config.samples_path = samples;
    }
    if let Some(report) = cli.report {
        config.report_path = report;
    }

    let records = load_records(Path::new(&config.samples_path)).await?;
    info!("Loaded {} samples from {}", records.len(), config.samples_path);

    let oracle = HermesClient::new(&config)?;
    let comparator = OracleComparator::new(oracle, &config);

    let run = comparator
        .run(&records, |progress| match progress {
            Progress::Compared(result) => println!("{}", result.line),
            Progress::Failed { index, error } => {
                println!("{}", format!("ERR {}: {:#}", index, error).red())
            }
        })
        .await;

    let summary = run.summary_lines(config.baseline)?;
    println!("\n{}", "=== Results ===".bold());
    for line in &summary {
        println!("{}", line);
    }

    run.write_report(Path::new(&config.report_path), config.baseline)
        .await?;
    println!("Report saved: {}", config.report_path);

    Ok(())
}
