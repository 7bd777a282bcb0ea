//! Redemption orchestration
//!
//! Maps the results of the resolution check, balance check and redeem call onto
//! exactly one [`RedeemOutcome`] and its exit code. Hard failures exit 1;
//! outcomes an automated caller polls through (unresolved, nothing to redeem, a
//! failed resolution check) exit 0.

use crate::types::{RedeemOutcome, RedeemReport, RedemptionRequest, RelayTransaction};
use alloy::primitives::U256;
use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

/// On-chain operations needed to redeem a condition
#[async_trait]
pub trait RedemptionService: Send + Sync {
    /// Whether the condition has reported payouts
    async fn is_condition_resolved(&self, condition_id: &str) -> Result<bool>;

    /// `(index_set, balance)` for every outcome slot the wallet could redeem
    async fn get_redeemable_index_and_balance(&self, condition_id: &str) -> Result<Vec<(u32, U256)>>;

    /// Submit the redemption and return the relay's transaction record
    async fn redeem(&self, condition_id: &str) -> Result<RelayTransaction>;
}

/// What to do when the balance query itself fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalanceCheckFallback {
    /// Attempt the redeem anyway; a wallet with nothing to redeem makes the
    /// relay transaction a no-op rather than a loss.
    #[default]
    RedeemAnyway,
    /// Stop with a hard error
    ReportError,
}

/// Run the redemption flow against `service`. Never panics, never returns an error:
/// every path ends in a report.
pub async fn run_redemption<S>(
    service: &S,
    request: &RedemptionRequest,
    fallback: BalanceCheckFallback,
) -> RedeemReport
where
    S: RedemptionService + ?Sized,
{
    let condition_id = request.condition_id.as_str();
    info!(
        "Redeem requested: condition={} neg_risk={}",
        short_id(condition_id),
        request.neg_risk
    );

    // 1. Resolution
    let resolved = match service.is_condition_resolved(condition_id).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("Resolution check failed for {}: {:#}", short_id(condition_id), e);
            return RedeemReport::completed(RedeemOutcome::error(format!(
                "Failed to check resolution: {:#}",
                e
            )));
        }
    };

    if !resolved {
        info!("Condition {} not yet resolved", short_id(condition_id));
        return RedeemReport::completed(RedeemOutcome::not_resolved());
    }

    // 2. Balance
    match service.get_redeemable_index_and_balance(condition_id).await {
        Ok(balances) => {
            if balances.iter().all(|(_, balance)| balance.is_zero()) {
                info!("No redeemable balance for {}", short_id(condition_id));
                return RedeemReport::completed(RedeemOutcome::no_balance());
            }
            info!("Redeemable balances: {:?}", balances);
        }
        Err(e) => match fallback {
            BalanceCheckFallback::RedeemAnyway => {
                warn!("Balance check failed ({:#}); attempting redeem anyway", e);
            }
            BalanceCheckFallback::ReportError => {
                let e = e.context("Balance check failed");
                return RedeemReport::failed(RedeemOutcome::from_error(&e));
            }
        },
    }

    // 3. Redeem
    match service.redeem(condition_id).await {
        Ok(tx) => {
            info!(
                "Redeem submitted: tx_id={} tx_hash={} state={}",
                tx.transaction_id, tx.transaction_hash, tx.state
            );
            RedeemReport::completed(RedeemOutcome::success(tx))
        }
        Err(e) => {
            warn!("Redeem failed: {:#}", e);
            RedeemReport::failed(RedeemOutcome::from_error(&e))
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
