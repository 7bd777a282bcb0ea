//! Oracle direction cross-check
//!
//! For every reference sample, fetches the oracle price at the window start and
//! `close_offset_secs` later, derives the realized direction and compares it with
//! the direction the reference source recorded. Samples that fail for any reason
//! are logged and left out of the tally.

use crate::config::{Baseline, CompareConfig};
use crate::error::CompareError;
use crate::services::hermes::PriceOracle;
use crate::types::{Direction, PredictionSample};
use anyhow::{anyhow, Context, Result};
use chrono::DateTime;
use rust_decimal::{Decimal, RoundingStrategy};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// `(close - open) / open * 100`, or `None` when `open` is zero or the result
/// does not fit a `Decimal`
pub fn percent_move(open: Decimal, close: Decimal) -> Option<Decimal> {
    close
        .checked_sub(open)?
        .checked_div(open)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
}

/// Ties go to the even digit, as float formatting does for exact halves
fn round_half_even(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven)
}

/// Result of comparing one sample against the oracle
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub index: usize,
    pub ts: i64,
    pub oracle_open: Decimal,
    pub oracle_close: Decimal,
    pub direction: Direction,
    pub matched: bool,
    /// Report line for this sample
    pub line: String,
}

impl ComparisonResult {
    pub fn new(
        index: usize,
        sample: &PredictionSample,
        oracle_open: Decimal,
        oracle_close: Decimal,
    ) -> Result<Self> {
        let direction = Direction::from_prices(oracle_open, oracle_close);
        let matched = direction.matches_label(&sample.bd);

        let oracle_move = percent_move(oracle_open, oracle_close).ok_or_else(|| {
            anyhow!("oracle move undefined at ts={} (open {}, close {})", sample.ts, oracle_open, oracle_close)
        })?;
        let reference_move = percent_move(sample.bo, sample.bc).ok_or_else(|| {
            anyhow!("reference move undefined at ts={} (open {}, close {})", sample.ts, sample.bo, sample.bc)
        })?;
        let gap = oracle_open
            .checked_sub(sample.bo)
            .ok_or_else(|| anyhow!("open gap overflows at ts={}", sample.ts))?;

        let when = DateTime::from_timestamp(sample.ts, 0)
            .ok_or_else(|| anyhow!("timestamp {} out of range", sample.ts))?;

        let line = format!(
            "{} {} Oracle:{:+.5}%={} Ref:{:+.5}%={} |{:.4}%| gap=${:+.0}",
            if matched { "✅" } else { "❌" },
            when.format("%m/%d %H:%M"),
            round_half_even(oracle_move, 5),
            direction,
            round_half_even(reference_move, 5),
            sample.bd,
            round_half_even(sample.bf, 4),
            round_half_even(gap, 0),
        );

        Ok(Self {
            index,
            ts: sample.ts,
            oracle_open,
            oracle_close,
            direction,
            matched,
            line,
        })
    }
}

/// Running match/mismatch counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub matched: u64,
    pub mismatched: u64,
}

impl Tally {
    pub fn record(&mut self, matched: bool) {
        if matched {
            self.matched += 1;
        } else {
            self.mismatched += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.matched + self.mismatched
    }

    /// Agreement in percent. Undefined (an error) when nothing was compared.
    pub fn match_rate(&self) -> Result<f64, CompareError> {
        rate(self.matched, self.total())
    }

    /// Agreement including the prior campaign's tally
    pub fn cumulative_rate(&self, baseline: Baseline) -> Result<f64, CompareError> {
        if self.total() == 0 {
            return Err(CompareError::NoComparableSamples);
        }
        rate(
            self.matched + baseline.matched,
            self.total() + baseline.total,
        )
    }
}

fn rate(matched: u64, total: u64) -> Result<f64, CompareError> {
    if total == 0 {
        return Err(CompareError::NoComparableSamples);
    }
    Ok(matched as f64 / total as f64 * 100.0)
}

/// Progress events emitted while a run is in flight
#[derive(Debug)]
pub enum Progress<'a> {
    Compared(&'a ComparisonResult),
    Failed {
        index: usize,
        error: &'a anyhow::Error,
    },
}

/// Compares reference samples against a price oracle, one at a time
pub struct OracleComparator<O> {
    oracle: O,
    close_offset_secs: i64,
    request_pause: Duration,
}

impl<O: PriceOracle> OracleComparator<O> {
    pub fn new(oracle: O, config: &CompareConfig) -> Self {
        Self {
            oracle,
            close_offset_secs: config.close_offset_secs,
            request_pause: config.request_pause,
        }
    }

    /// Override the pause inserted after every oracle request
    pub fn with_request_pause(mut self, pause: Duration) -> Self {
        self.request_pause = pause;
        self
    }

    async fn pause(&self) {
        if !self.request_pause.is_zero() {
            tokio::time::sleep(self.request_pause).await;
        }
    }

    /// Compare a single sample. Both oracle requests are followed by the pause.
    pub async fn compare_sample(
        &self,
        index: usize,
        sample: &PredictionSample,
    ) -> Result<ComparisonResult> {
        let open = self
            .oracle
            .price_at(sample.ts)
            .await
            .with_context(|| format!("oracle price at {}", sample.ts))?;
        self.pause().await;

        let close_ts = sample.ts + self.close_offset_secs;
        let close = self
            .oracle
            .price_at(close_ts)
            .await
            .with_context(|| format!("oracle price at {}", close_ts))?;
        self.pause().await;

        ComparisonResult::new(index, sample, open, close)
    }

    /// Run the whole batch in order.
    ///
    /// Records are decoded lazily so a malformed record only fails itself.
    pub async fn run<F>(&self, records: &[serde_json::Value], mut on_progress: F) -> ComparisonRun
    where
        F: FnMut(Progress<'_>),
    {
        let mut run = ComparisonRun::default();
        info!("Comparing {} samples against the oracle", records.len());

        for (index, record) in records.iter().enumerate() {
            let outcome = match serde_json::from_value::<PredictionSample>(record.clone()) {
                Ok(sample) => self.compare_sample(index, &sample).await,
                Err(e) => Err(anyhow::Error::new(e).context("malformed sample")),
            };

            match outcome {
                Ok(result) => {
                    debug!(
                        "Sample {}: oracle {} -> {} = {} (matched: {})",
                        index, result.oracle_open, result.oracle_close, result.direction, result.matched
                    );
                    run.tally.record(result.matched);
                    on_progress(Progress::Compared(&result));
                    run.results.push(result);
                }
                Err(error) => {
                    warn!("Sample {} skipped: {:#}", index, error);
                    on_progress(Progress::Failed {
                        index,
                        error: &error,
                    });
                    run.failed += 1;
                }
            }
        }

        info!(
            "Comparison finished: {} matched, {} mismatched, {} failed",
            run.tally.matched, run.tally.mismatched, run.failed
        );
        run
    }
}

/// Everything a batch produced
#[derive(Debug, Clone, Default)]
pub struct ComparisonRun {
    pub results: Vec<ComparisonResult>,
    pub tally: Tally,
    pub failed: usize,
}

impl ComparisonRun {
    /// The two summary lines: this run's rate and the cumulative rate.
    pub fn summary_lines(&self, baseline: Baseline) -> Result<[String; 2], CompareError> {
        let tally = self.tally;
        let rate = tally.match_rate()?;
        let cumulative = tally.cumulative_rate(baseline)?;

        Ok([
            format!(
                "{} of {} samples matched ({:.1}%)",
                tally.matched,
                tally.total(),
                rate
            ),
            format!(
                "Including prior {}: {}/{} ({:.1}%)",
                baseline.total,
                tally.matched + baseline.matched,
                tally.total() + baseline.total,
                cumulative
            ),
        ])
    }

    /// Full report text: one line per compared sample, a blank line, the summary
    pub fn render_report(&self, baseline: Baseline) -> Result<String, CompareError> {
        let summary = self.summary_lines(baseline)?;
        let mut report = String::new();
        for result in &self.results {
            report.push_str(&result.line);
            report.push('\n');
        }
        report.push('\n');
        for line in summary {
            report.push_str(&line);
            report.push('\n');
        }
        Ok(report)
    }

    /// Overwrite `path` with the rendered report
    pub async fn write_report(&self, path: &Path, baseline: Baseline) -> Result<(), CompareError> {
        let report = self.render_report(baseline)?;
        tokio::fs::write(path, report)
            .await
            .map_err(|source| CompareError::WriteReport {
                path: path.display().to_string(),
                source,
            })?;
        info!("Report written to {}", path.display());
        Ok(())
    }
}

/// Read the samples file as raw JSON records
pub async fn load_records(path: &Path) -> Result<Vec<serde_json::Value>, CompareError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CompareError::ReadSamples {
            path: path.display().to_string(),
            source,
        })?;

    serde_json::from_str(&raw).map_err(|source| CompareError::ParseSamples {
        path: path.display().to_string(),
        source,
    })
}
