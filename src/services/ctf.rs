//! Conditional Token Framework (CTF) redemption
//!
//! Resolution and balances are read straight from the CTF contract over Polygon
//! JSON-RPC. Redemption is ABI-encoded and executed from the funder wallet
//! (proxy wallet or Safe) via the builder relay.
//!
//! Standard markets redeem on the CTF contract with index sets `[1, 2]`.
//! NegRisk markets hold positions in wrapped collateral and redeem through the
//! NegRisk adapter, which takes explicit per-outcome amounts.

use crate::config::{RedeemCredentials, RedeemEndpoints};
use crate::services::clob::ClobSession;
use crate::services::redemption::RedemptionService;
use crate::services::relay::RelayClient;
use crate::services::safe_proxy::derive_wallet;
use crate::types::RelayTransaction;
use alloy::primitives::{address, keccak256, Address, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// CTF contract on Polygon
const CTF_ADDRESS: Address = address!("4d97dcd97ec945f40cf65f87097ace5ea0476045");
/// USDC on Polygon (6 decimals), collateral for standard markets
const USDC_ADDRESS: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
/// NegRisk adapter, redeems NegRisk positions
const NEG_RISK_ADAPTER: Address = address!("d91E80cF2E7be2e162c6513ceD06f1dD0dA35296");
/// Wrapped collateral backing NegRisk positions
const NEG_RISK_WRAPPED_COLLATERAL: Address = address!("3A3BD7bb9528E159577F7C2f685CC81A765002E2");

/// Binary markets: YES = 0b01, NO = 0b10
const INDEX_SETS: [u32; 2] = [1, 2];

sol! {
    function redeemPositions(
        address collateralToken,
        bytes32 parentCollectionId,
        bytes32 conditionId,
        uint256[] indexSets
    );

    function balanceOf(address account, uint256 id) external view returns (uint256);

    function payoutDenominator(bytes32 conditionId) external view returns (uint256);
}

// Adapter's redeemPositions has a different signature; separate module avoids
// the name clash with the CTF call above.
mod neg_risk_abi {
    alloy::sol! {
        function redeemPositions(bytes32 conditionId, uint256[] amounts);
    }
}

/// Live redemption backed by Polygon RPC reads and relay writes
pub struct CtfRedeemService {
    client: reqwest::Client,
    rpc_url: String,
    wallet: Address,
    neg_risk: bool,
    relay: RelayClient,
}

impl CtfRedeemService {
    /// Derive the CLOB session and build the relay client for the configured wallet.
    pub async fn connect(
        creds: &RedeemCredentials,
        endpoints: &RedeemEndpoints,
        neg_risk: bool,
    ) -> Result<Self> {
        let clob = ClobSession::connect(creds, endpoints).await?;

        let wallet: Address = creds
            .proxy_address
            .trim()
            .parse()
            .context("Failed to parse POLY_PROXY_ADDRESS")?;

        let expected = derive_wallet(creds.wallet_kind, clob.address());
        if expected != wallet {
            warn!(
                "POLY_PROXY_ADDRESS {:?} is not the {} wallet derived from the signer ({:?}); the relay may reject the transaction",
                wallet, creds.wallet_kind, expected
            );
        }

        let relay = RelayClient::new(
            &endpoints.relayer_url,
            endpoints.chain_id,
            clob.signer().clone(),
            wallet,
            creds.wallet_kind,
            creds.builder.clone(),
        )?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create RPC client")?;

        info!(
            "Redeem service ready: signer={:?} wallet={:?} ({}) neg_risk={}",
            clob.address(),
            wallet,
            creds.wallet_kind,
            neg_risk
        );

        Ok(Self {
            client,
            rpc_url: endpoints.polygon_rpc_url.clone(),
            wallet,
            neg_risk,
            relay,
        })
    }

    fn collateral(&self) -> Address {
        if self.neg_risk {
            NEG_RISK_WRAPPED_COLLATERAL
        } else {
            USDC_ADDRESS
        }
    }

    /// Read-only `eth_call` against the CTF contract, decoded as one uint256 word
    async fn call_uint(&self, calldata: Vec<u8>) -> Result<U256> {
        let rpc_payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_call",
            "params": [{
                "to": format!("{:?}", CTF_ADDRESS),
                "data": format!("0x{}", hex::encode(calldata)),
            }, "latest"],
            "id": 1
        });

        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&rpc_payload)
            .send()
            .await
            .context("Polygon RPC call failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Polygon RPC error {}: {}", status, body);
        }

        let json: serde_json::Value = resp.json().await.context("Failed to parse RPC response")?;
        parse_uint_result(&json)
    }
}

#[async_trait]
impl RedemptionService for CtfRedeemService {
    async fn is_condition_resolved(&self, condition_id: &str) -> Result<bool> {
        let call = payoutDenominatorCall {
            conditionId: parse_condition_id(condition_id)?,
        };
        let denominator = self.call_uint(call.abi_encode()).await?;
        debug!("payoutDenominator({}) = {}", condition_id, denominator);
        Ok(!denominator.is_zero())
    }

    async fn get_redeemable_index_and_balance(&self, condition_id: &str) -> Result<Vec<(u32, U256)>> {
        let cond = parse_condition_id(condition_id)?;
        let collateral = self.collateral();

        let mut balances = Vec::with_capacity(INDEX_SETS.len());
        for index_set in INDEX_SETS {
            let call = balanceOfCall {
                account: self.wallet,
                id: position_id(&cond, index_set, &collateral),
            };
            let balance = self
                .call_uint(call.abi_encode())
                .await
                .with_context(|| format!("balanceOf index set {}", index_set))?;
            balances.push((index_set, balance));
        }
        Ok(balances)
    }

    async fn redeem(&self, condition_id: &str) -> Result<RelayTransaction> {
        let cond = parse_condition_id(condition_id)?;

        if self.neg_risk {
            let amounts: Vec<U256> = self
                .get_redeemable_index_and_balance(condition_id)
                .await
                .context("NegRisk redeem needs on-chain amounts")?
                .into_iter()
                .map(|(_, balance)| balance)
                .collect();

            info!("CTF Redeem (NegRisk) amounts {:?} via adapter {:?}", amounts, NEG_RISK_ADAPTER);
            let call = neg_risk_abi::redeemPositionsCall {
                conditionId: cond,
                amounts,
            };
            self.relay
                .execute(NEG_RISK_ADAPTER, &call.abi_encode(), "CTF Redeem (NegRisk)")
                .await
                .context("CTF Redeem (NegRisk) failed")
        } else {
            let call = redeemPositionsCall {
                collateralToken: USDC_ADDRESS,
                parentCollectionId: B256::ZERO,
                conditionId: cond,
                indexSets: INDEX_SETS.iter().map(|&i| U256::from(i)).collect(),
            };
            self.relay
                .execute(CTF_ADDRESS, &call.abi_encode(), "CTF Redeem")
                .await
                .context("CTF Redeem failed")
        }
    }
}

/// Parse a 32-byte hex condition id, with or without `0x`
pub fn parse_condition_id(condition_id: &str) -> Result<B256> {
    let hex_str = condition_id.trim();
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(hex_str).context("Invalid condition ID hex")?;
    if bytes.len() != 32 {
        bail!("Condition ID must be 32 bytes, got {}", bytes.len());
    }
    Ok(B256::from_slice(&bytes))
}

/// ERC-1155 position id for a top-level collection:
///   collectionId = keccak256(conditionId ++ uint256(indexSet))
///   positionId   = keccak256(collateral ++ collectionId)
pub fn position_id(condition_id: &B256, index_set: u32, collateral: &Address) -> U256 {
    let mut packed = Vec::with_capacity(64);
    packed.extend_from_slice(condition_id.as_slice());
    packed.extend_from_slice(&U256::from(index_set).to_be_bytes::<32>());
    let collection_id = keccak256(&packed);

    let mut packed2 = Vec::with_capacity(52);
    packed2.extend_from_slice(collateral.as_slice());
    packed2.extend_from_slice(collection_id.as_slice());
    U256::from_be_bytes(keccak256(&packed2).0)
}

/// Decode a JSON-RPC `eth_call` response carrying one uint256
fn parse_uint_result(json: &serde_json::Value) -> Result<U256> {
    if let Some(error) = json.get("error") {
        bail!("RPC error: {}", error);
    }

    let result = json["result"]
        .as_str()
        .context("RPC response has no result")?;
    let hex_str = result.strip_prefix("0x").unwrap_or(result);
    if hex_str.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(hex_str, 16).with_context(|| format!("Invalid uint256 result {:?}", result))
}
