//! CTF position redemption
//!
//! Usage: `redeem <condition_id> [--neg-risk] [--strict-balance]`
//!
//! Prints exactly one JSON object to stdout. Exit code 0 means the run reached
//! an outcome (including "not resolved", "no balance" and a failed resolution
//! check); 1 means bad usage, missing configuration or an unexpected error.
//!
//! Callers merge stderr into stdout and read the JSON from the output, so
//! logging is off unless `-v` or `RUST_LOG` asks for it. `--help` and
//! `--version` are for interactive use and print plain text.

use clap::error::ErrorKind;
use clap::Parser;
use polymarket_ops::services::{run_redemption, BalanceCheckFallback, CtfRedeemService, RedemptionService};
use polymarket_ops::{RedeemCredentials, RedeemEndpoints, RedeemOutcome, RedeemReport, RedemptionRequest};
use std::future::Future;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const PROGRAM: &str = "redeem";

#[derive(Parser, Debug)]
#[command(name = "redeem")]
#[command(about = "Redeem resolved Polymarket positions through the builder relay")]
#[command(version)]
struct Cli {
    /// Condition id (32-byte hex)
    condition_id: Option<String>,

    /// Settle through the NegRisk adapter
    #[arg(long)]
    neg_risk: bool,

    /// Fail instead of redeeming when the balance check errors
    #[arg(long)]
    strict_balance: bool,

    /// Log to stderr (debug level)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn fallback(&self) -> BalanceCheckFallback {
        if self.strict_balance {
            BalanceCheckFallback::ReportError
        } else {
            BalanceCheckFallback::RedeemAnyway
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let report = match Cli::try_parse() {
        Ok(cli) => {
            init_logging(cli.verbose);
            dotenvy::dotenv().ok();
            invoke(
                cli,
                |name| std::env::var(name).ok(),
                |creds, endpoints, neg_risk| async move {
                    CtfRedeemService::connect(&creds, &endpoints, neg_risk).await
                },
            )
            .await
        }
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(_) => RedeemReport::usage(PROGRAM),
    };

    println!("{}", report.to_json());
    ExitCode::from(report.exit_code)
}

/// Filter used when `RUST_LOG` is unset
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "off"
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Validate configuration, build the service through `connect` and run the flow.
///
/// `connect` is only called once every required variable is present.
async fn invoke<L, F, Fut, S>(cli: Cli, lookup: L, connect: F) -> RedeemReport
where
    L: Fn(&str) -> Option<String>,
    F: FnOnce(RedeemCredentials, RedeemEndpoints, bool) -> Fut,
    Fut: Future<Output = anyhow::Result<S>>,
    S: RedemptionService,
{
    let fallback = cli.fallback();
    let Some(condition_id) = cli.condition_id else {
        return RedeemReport::usage(PROGRAM);
    };

    let creds = match RedeemCredentials::from_lookup(&lookup) {
        Ok(creds) => creds,
        Err(e) => return RedeemReport::failed(RedeemOutcome::error(e.to_string())),
    };
    let endpoints = RedeemEndpoints::from_lookup(&lookup);

    let request = RedemptionRequest {
        condition_id,
        neg_risk: cli.neg_risk,
    };

    let service = match connect(creds, endpoints, request.neg_risk).await {
        Ok(service) => service,
        Err(e) => return RedeemReport::failed(RedeemOutcome::from_error(&e)),
    };

    run_redemption(&service, &request, fallback).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use polymarket_ops::config::REQUIRED_REDEEM_VARS;
    use polymarket_ops::RelayTransaction;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Resolved or not; nothing to redeem either way
    struct StubService {
        resolved: bool,
    }

    #[async_trait]
    impl RedemptionService for StubService {
        async fn is_condition_resolved(&self, _condition_id: &str) -> Result<bool> {
            Ok(self.resolved)
        }

        async fn get_redeemable_index_and_balance(&self, _condition_id: &str) -> Result<Vec<(u32, U256)>> {
            Ok(vec![(1, U256::ZERO), (2, U256::ZERO)])
        }

        async fn redeem(&self, _condition_id: &str) -> Result<RelayTransaction> {
            Err(anyhow!("nothing to redeem"))
        }
    }

    fn full_env() -> HashMap<String, String> {
        REQUIRED_REDEEM_VARS
            .iter()
            .map(|name| (name.to_string(), format!("value-{}", name.to_lowercase())))
            .collect()
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("redeem").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parses_condition_and_flags() {
        let cli = Cli::try_parse_from(["redeem", "0xabc", "--neg-risk"]).unwrap();
        assert_eq!(cli.condition_id.as_deref(), Some("0xabc"));
        assert!(cli.neg_risk);
        assert_eq!(cli.fallback(), BalanceCheckFallback::RedeemAnyway);

        let cli = Cli::try_parse_from(["redeem", "--strict-balance", "0xabc"]).unwrap();
        assert!(!cli.neg_risk);
        assert_eq!(cli.fallback(), BalanceCheckFallback::ReportError);
    }

    #[test]
    fn test_logging_is_silent_by_default() {
        assert_eq!(default_filter(false), "off");
        assert_eq!(default_filter(true), "debug");
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        let err = Cli::try_parse_from(["redeem", "0xabc", "--bogus"]).unwrap_err();
        assert!(!matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion));
    }

    #[tokio::test]
    async fn test_missing_condition_is_usage_error() {
        let report = invoke(cli(&[]), |_| None, |_, _, _| async {
            Ok(StubService { resolved: true })
        })
        .await;
        assert_eq!(report.exit_code, 1);
        assert_eq!(
            report.to_json(),
            r#"{"status":"ERROR","message":"Usage: redeem <condition_id> [--neg-risk] [--strict-balance]"}"#
        );
    }

    #[tokio::test]
    async fn test_missing_env_stops_before_connect() {
        let mut env = full_env();
        env.remove("POLY_PASSPHRASE");
        env.remove("BUILDER_SECRET");
        let connected = AtomicBool::new(false);

        let report = invoke(
            cli(&["0xabc"]),
            |name| env.get(name).cloned(),
            |_, _, _| {
                connected.store(true, Ordering::SeqCst);
                async { Ok(StubService { resolved: true }) }
            },
        )
        .await;

        assert_eq!(report.exit_code, 1);
        assert_eq!(
            report.to_json(),
            r#"{"status":"ERROR","message":"Missing env vars: POLY_PASSPHRASE, BUILDER_SECRET"}"#
        );
        assert!(!connected.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_connect_failure_is_error_with_traceback() {
        let env = full_env();
        let report = invoke(
            cli(&["0xabc"]),
            |name| env.get(name).cloned(),
            |_, _, _| async {
                Err::<StubService, _>(anyhow!("invalid hex character").context("Failed to parse private key"))
            },
        )
        .await;

        assert_eq!(report.exit_code, 1);
        match &report.outcome {
            RedeemOutcome::Error { message, traceback } => {
                assert_eq!(message, "Failed to parse private key: invalid hex character");
                assert!(traceback.as_deref().unwrap().contains("invalid hex character"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(json["status"], "ERROR");
        assert!(json["traceback"].is_string());
    }

    #[tokio::test]
    async fn test_connect_receives_config_and_flag() {
        let mut env = full_env();
        env.insert("RELAYER_URL".to_string(), "http://relay.test".to_string());

        let report = invoke(
            cli(&["0xabc", "--neg-risk"]),
            |name| env.get(name).cloned(),
            |creds, endpoints, neg_risk| async move {
                assert_eq!(creds.proxy_address, "value-poly_proxy_address");
                assert_eq!(endpoints.relayer_url, "http://relay.test");
                assert!(neg_risk);
                Ok(StubService { resolved: false })
            },
        )
        .await;

        assert_eq!(report, RedeemReport::completed(RedeemOutcome::not_resolved()));
    }

    #[tokio::test]
    async fn test_invalid_wallet_type_is_config_error() {
        let mut env = full_env();
        env.insert("POLY_WALLET_TYPE".to_string(), "eoa".to_string());

        let report = invoke(
            cli(&["0xabc"]),
            |name| env.get(name).cloned(),
            |_, _, _| async { Ok(StubService { resolved: true }) },
        )
        .await;

        assert_eq!(report.exit_code, 1);
        assert_eq!(report.outcome.status(), "ERROR");
    }

    #[tokio::test]
    async fn test_resolved_without_balance_completes() {
        let env = full_env();
        let report = invoke(
            cli(&["0xabc"]),
            |name| env.get(name).cloned(),
            |_, _, _| async { Ok(StubService { resolved: true }) },
        )
        .await;
        assert_eq!(report, RedeemReport::completed(RedeemOutcome::no_balance()));
    }
}
