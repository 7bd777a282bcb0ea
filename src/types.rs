//! Core types shared by the comparator and the redemption invoker

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Realized direction of a price window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    #[serde(alias = "DN")]
    Down,
}

impl Direction {
    /// `Up` only on a strict rise; an unchanged price is `Down`.
    pub fn from_prices(open: Decimal, close: Decimal) -> Self {
        if close > open {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }

    /// Whether a recorded direction label names this direction.
    /// `DN` is the short form some reference exports use for `DOWN`.
    pub fn matches_label(&self, label: &str) -> bool {
        match self {
            Direction::Up => label == "UP",
            Direction::Down => label == "DOWN" || label == "DN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reference-source observation to validate against the oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSample {
    /// Window start, seconds since epoch
    pub ts: i64,
    /// Reference open price
    pub bo: Decimal,
    /// Reference close price
    pub bc: Decimal,
    /// Reference direction label, kept verbatim for display
    pub bd: String,
    /// Reference fee/funding figure, percent
    pub bf: Decimal,
}

/// A condition to redeem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionRequest {
    pub condition_id: String,
    /// Settle through the NegRisk adapter instead of the CTF contract
    pub neg_risk: bool,
}

/// Transaction record returned by the relay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayTransaction {
    #[serde(rename = "transactionID", default)]
    pub transaction_id: String,
    #[serde(rename = "transactionHash", default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub state: String,
}

/// Terminal result of a redemption attempt, one per invocation.
///
/// Serialized as a flat JSON object with a `status` discriminator; this is the
/// only thing written to stdout by the `redeem` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedeemOutcome {
    Success {
        tx_id: String,
        tx_hash: String,
        state: String,
        message: String,
    },
    NotResolved {
        message: String,
    },
    NoBalance {
        message: String,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        traceback: Option<String>,
    },
}

impl RedeemOutcome {
    pub fn success(tx: RelayTransaction) -> Self {
        RedeemOutcome::Success {
            tx_id: tx.transaction_id,
            tx_hash: tx.transaction_hash,
            state: tx.state,
            message: "Redeem executed successfully".to_string(),
        }
    }

    pub fn not_resolved() -> Self {
        RedeemOutcome::NotResolved {
            message: "Condition not yet resolved".to_string(),
        }
    }

    pub fn no_balance() -> Self {
        RedeemOutcome::NoBalance {
            message: "No redeemable balance".to_string(),
        }
    }

    /// Error with a message only
    pub fn error(message: impl Into<String>) -> Self {
        RedeemOutcome::Error {
            message: message.into(),
            traceback: None,
        }
    }

    /// Error carrying the full cause chain as its diagnostic trace
    pub fn from_error(err: &anyhow::Error) -> Self {
        RedeemOutcome::Error {
            message: format!("{:#}", err),
            traceback: Some(format!("{:?}", err)),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            RedeemOutcome::Success { .. } => "SUCCESS",
            RedeemOutcome::NotResolved { .. } => "NOT_RESOLVED",
            RedeemOutcome::NoBalance { .. } => "NO_BALANCE",
            RedeemOutcome::Error { .. } => "ERROR",
        }
    }
}

/// Outcome plus the process exit code it maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemReport {
    pub outcome: RedeemOutcome,
    pub exit_code: u8,
}

impl RedeemReport {
    /// An expected business outcome (exit 0)
    pub fn completed(outcome: RedeemOutcome) -> Self {
        Self {
            outcome,
            exit_code: 0,
        }
    }

    /// A hard failure (exit 1)
    pub fn failed(outcome: RedeemOutcome) -> Self {
        Self {
            outcome,
            exit_code: 1,
        }
    }

    pub fn usage(program: &str) -> Self {
        Self::failed(RedeemOutcome::error(format!(
            "Usage: {} <condition_id> [--neg-risk] [--strict-balance]",
            program
        )))
    }

    /// Single-line JSON for stdout
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.outcome).unwrap_or_else(|e| {
            format!(
                r#"{{"status":"ERROR","message":"Failed to serialize outcome: {}"}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_direction_rule() {
        assert_eq!(Direction::from_prices(dec!(100), dec!(101)), Direction::Up);
        assert_eq!(Direction::from_prices(dec!(100), dec!(99)), Direction::Down);
        assert_eq!(Direction::from_prices(dec!(100), dec!(100)), Direction::Down);
    }

    #[test]
    fn test_direction_labels() {
        assert!(Direction::Up.matches_label("UP"));
        assert!(Direction::Down.matches_label("DOWN"));
        assert!(Direction::Down.matches_label("DN"));
        assert!(!Direction::Up.matches_label("up"));
        assert!(!Direction::Down.matches_label("UP"));
    }

    #[test]
    fn test_sample_decodes_numbers() {
        let sample: PredictionSample = serde_json::from_value(json!({
            "ts": 1700000000,
            "bo": 2000.5,
            "bc": 2010,
            "bd": "UP",
            "bf": 0.0123
        }))
        .unwrap();
        assert_eq!(sample.bo, dec!(2000.5));
        assert_eq!(sample.bc, dec!(2010));
        assert_eq!(sample.bf, dec!(0.0123));
    }

    #[test]
    fn test_sample_missing_field_fails() {
        let result: Result<PredictionSample, _> =
            serde_json::from_value(json!({"ts": 1, "bo": 1, "bc": 2, "bd": "UP"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_outcome_json_shapes() {
        let success = RedeemOutcome::success(RelayTransaction {
            transaction_id: "abc".to_string(),
            transaction_hash: "0xdead".to_string(),
            state: "STATE_MINED".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&success).unwrap(),
            json!({
                "status": "SUCCESS",
                "tx_id": "abc",
                "tx_hash": "0xdead",
                "state": "STATE_MINED",
                "message": "Redeem executed successfully"
            })
        );

        assert_eq!(
            serde_json::to_value(RedeemOutcome::not_resolved()).unwrap(),
            json!({"status": "NOT_RESOLVED", "message": "Condition not yet resolved"})
        );
        assert_eq!(
            serde_json::to_value(RedeemOutcome::no_balance()).unwrap(),
            json!({"status": "NO_BALANCE", "message": "No redeemable balance"})
        );
        assert_eq!(
            serde_json::to_value(RedeemOutcome::error("boom")).unwrap(),
            json!({"status": "ERROR", "message": "boom"})
        );
    }

    #[test]
    fn test_error_outcome_carries_chain() {
        let err = anyhow::anyhow!("relay said no").context("Redeem failed");
        let outcome = RedeemOutcome::from_error(&err);
        match outcome {
            RedeemOutcome::Error { message, traceback } => {
                assert_eq!(message, "Redeem failed: relay said no");
                let trace = traceback.unwrap();
                assert!(trace.contains("Caused by"));
                assert!(trace.contains("relay said no"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_outcome_parses_back() {
        let line = r#"{"status":"NO_BALANCE","message":"No redeemable balance"}"#;
        let outcome: RedeemOutcome = serde_json::from_str(line).unwrap();
        assert_eq!(outcome, RedeemOutcome::no_balance());
        assert_eq!(outcome.status(), "NO_BALANCE");
    }

    #[test]
    fn test_usage_report() {
        let report = RedeemReport::usage("redeem");
        assert_eq!(report.exit_code, 1);
        assert_eq!(
            report.to_json(),
            r#"{"status":"ERROR","message":"Usage: redeem <condition_id> [--neg-risk] [--strict-balance]"}"#
        );
    }
}
