//! Builder relay client
//!
//! The relay executes gasless transactions from the wallet owned by the signing
//! EOA. Two wallet kinds are supported:
//!
//! - **PROXY**: the call is wrapped in `ProxyFactory.proxy([...])`, hashed with
//!   the `rlx:` relay-hub scheme and signed by the EOA.
//! - **SAFE**: the call is wrapped in an EIP-712 Safe transaction and signed
//!   eth_sign style.
//!
//! Either request is posted to `/submit` with builder HMAC headers, then polled
//! on `/transaction` until it lands.

use crate::config::{BuilderCredentials, WalletKind};
use crate::services::safe_proxy::PROXY_FACTORY;
use crate::types::RelayTransaction;
use alloy::primitives::{address, keccak256, Address, Bytes, B256, U256};
use alloy::signers::{local::PrivateKeySigner, Signer};
use alloy::sol;
use alloy::sol_types::SolCall;
use anyhow::{bail, Context, Result};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
const POLL_ATTEMPTS: u32 = 30;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Relay hub the proxy factory trusts on Polygon
const RELAY_HUB: Address = address!("D216153c06E857cD7f72665E0aF1d7D82172F494");
/// Gas limit signed into proxy transactions
const PROXY_GAS_LIMIT: u64 = 10_000_000;
/// `CallType.Call` in the proxy factory
const PROXY_CALL: u8 = 1;

sol! {
    struct ProxyTransaction {
        uint8 typeCode;
        address to;
        uint256 value;
        bytes data;
    }

    function proxy(ProxyTransaction[] calls) external payable returns (bytes[] returnValues);
}

/// Relay client bound to one signer and one contract wallet
pub struct RelayClient {
    client: reqwest::Client,
    base_url: String,
    chain_id: u64,
    signer: PrivateKeySigner,
    wallet: Address,
    wallet_kind: WalletKind,
    builder: BuilderCredentials,
}

impl RelayClient {
    pub fn new(
        base_url: &str,
        chain_id: u64,
        signer: PrivateKeySigner,
        wallet: Address,
        wallet_kind: WalletKind,
        builder: BuilderCredentials,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .context("Failed to create relay HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            chain_id,
            signer,
            wallet,
            wallet_kind,
            builder,
        })
    }

    /// Submit `calldata` to `to` from the wallet and wait for the relay to settle it
    pub async fn execute(&self, to: Address, calldata: &[u8], metadata: &str) -> Result<RelayTransaction> {
        info!(
            "Relay: EOA={:?} {}={:?} target={:?} calldata_len={} ({})",
            self.signer.address(),
            self.wallet_kind,
            self.wallet,
            to,
            calldata.len(),
            metadata
        );

        let request = match self.wallet_kind {
            WalletKind::Proxy => self.proxy_request(to, calldata, metadata).await?,
            WalletKind::Safe => self.safe_request(to, calldata, metadata).await?,
        };
        let body = serde_json::to_string(&request)?;

        let response = self
            .authed(reqwest::Method::POST, "/submit", &body)?
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .context("Failed to send relay request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            bail!("Relay error {}: {}", status, error_body);
        }

        let submitted: RelayTransaction = response
            .json()
            .await
            .context("Failed to parse submit response")?;

        if submitted.transaction_id.is_empty() {
            bail!("Relay returned no transaction ID");
        }
        info!("Relay submitted: tx_id={}", submitted.transaction_id);

        self.poll_transaction(submitted).await
    }

    /// PROXY request: `ProxyFactory.proxy([call])` signed over the relay-hub hash
    async fn proxy_request(&self, to: Address, calldata: &[u8], metadata: &str) -> Result<serde_json::Value> {
        let eoa = self.signer.address();

        // 1. Nonce and relay address
        let payload = self.get_relay_payload(eoa).await?;
        debug!("Relay payload: nonce={} relay={:?}", payload.nonce, payload.relay);

        // 2. Wrap the call for the factory, hash and sign
        let data = proxy_calldata(to, calldata);
        let tx_hash = proxy_struct_hash(eoa, &data, PROXY_GAS_LIMIT, &payload.nonce, payload.relay)?;
        let signature = self
            .signer
            .sign_message(tx_hash.as_slice())
            .await
            .context("Failed to sign proxy transaction")?;

        Ok(serde_json::json!({
            "type": WalletKind::Proxy.as_str(),
            "from": format!("{:?}", eoa),
            "to": format!("{:?}", PROXY_FACTORY),
            "proxyWallet": format!("{:?}", self.wallet),
            "data": format!("0x{}", hex::encode(&data)),
            "signature": format!("0x{}", hex::encode(signature.as_bytes())),
            "nonce": payload.nonce,
            "signatureParams": {
                "gasPrice": "0",
                "gasLimit": PROXY_GAS_LIMIT.to_string(),
                "relayerFee": "0",
                "relayHub": format!("{:?}", RELAY_HUB),
                "relay": format!("{:?}", payload.relay)
            },
            "metadata": metadata
        }))
    }

    /// SAFE request: EIP-712 Safe transaction, eth_sign signature with v + 4
    async fn safe_request(&self, to: Address, calldata: &[u8], metadata: &str) -> Result<serde_json::Value> {
        let eoa = self.signer.address();

        // 1. Nonce
        let nonce = self.get_nonce(eoa).await?;
        debug!("Relay nonce: {}", nonce);

        // 2. EIP-712 Safe transaction hash, signed eth_sign style
        let tx_hash = safe_tx_hash(self.chain_id, self.wallet, to, calldata, &nonce)?;
        let signature = self
            .signer
            .sign_message(tx_hash.as_slice())
            .await
            .context("Failed to sign Safe transaction")?;

        // Safe marks eth_sign signatures with v + 4 (31/32)
        let v: u8 = if signature.v() { 32 } else { 31 };
        let mut packed_sig = Vec::with_capacity(65);
        packed_sig.extend_from_slice(&signature.r().to_be_bytes::<32>());
        packed_sig.extend_from_slice(&signature.s().to_be_bytes::<32>());
        packed_sig.push(v);

        Ok(serde_json::json!({
            "type": WalletKind::Safe.as_str(),
            "from": format!("{:?}", eoa),
            "to": format!("{:?}", to),
            "proxyWallet": format!("{:?}", self.wallet),
            "data": format!("0x{}", hex::encode(calldata)),
            "signature": format!("0x{}", hex::encode(&packed_sig)),
            "value": "0",
            "nonce": nonce,
            "signatureParams": {
                "gasPrice": "0",
                "operation": "0",
                "safeTxnGas": "0",
                "baseGas": "0",
                "gasToken": ZERO_ADDRESS,
                "refundReceiver": ZERO_ADDRESS
            },
            "metadata": metadata
        }))
    }

    /// Request builder with builder auth headers for `method path body`
    fn authed(&self, method: reqwest::Method, path: &str, body: &str) -> Result<reqwest::RequestBuilder> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let payload = format!("{}{}{}{}", timestamp, method.as_str(), path, body);
        let signature = builder_signature(&self.builder.secret, &payload)?;

        Ok(self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header("POLY_BUILDER_TIMESTAMP", timestamp)
            .header("POLY_BUILDER_SIGNATURE", signature)
            .header("POLY_BUILDER_API_KEY", &self.builder.api_key)
            .header("POLY_BUILDER_PASSPHRASE", &self.builder.passphrase))
    }

    async fn get_nonce(&self, eoa: Address) -> Result<String> {
        let path = format!("/nonce?address={:?}&type=SAFE", eoa);
        let response = self
            .authed(reqwest::Method::GET, &path, "")?
            .send()
            .await
            .context("Failed to get nonce from relay")?;

        if !response.status().is_success() {
            let status = response.status();
            let err = response.text().await.unwrap_or_default();
            bail!("Nonce request failed ({}): {}", status, err);
        }

        #[derive(Deserialize)]
        struct NonceResponse {
            nonce: serde_json::Value,
        }

        let resp: NonceResponse = response
            .json()
            .await
            .context("Failed to parse nonce response")?;

        nonce_string(resp.nonce)
    }

    /// Nonce and relay address for the next PROXY transaction
    async fn get_relay_payload(&self, eoa: Address) -> Result<RelayPayload> {
        let path = format!("/relay-payload?address={:?}&type=PROXY", eoa);
        let response = self
            .authed(reqwest::Method::GET, &path, "")?
            .send()
            .await
            .context("Failed to get relay payload")?;

        if !response.status().is_success() {
            let status = response.status();
            let err = response.text().await.unwrap_or_default();
            bail!("Relay payload request failed ({}): {}", status, err);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse relay payload")?;
        parse_relay_payload(json)
    }

    /// Poll until the transaction is mined/confirmed or rejected.
    ///
    /// Transient poll failures are skipped. If the relay never settles within the
    /// window, the last observed record is returned as-is.
    async fn poll_transaction(&self, submitted: RelayTransaction) -> Result<RelayTransaction> {
        let mut latest = submitted;
        let path = format!("/transaction?id={}", latest.transaction_id);

        for attempt in 1..=POLL_ATTEMPTS {
            tokio::time::sleep(POLL_INTERVAL).await;

            let response = match self.authed(reqwest::Method::GET, &path, "")?.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    debug!("Relay poll attempt {} failed: {}", attempt, e);
                    continue;
                }
            };

            let Ok(records) = response.json::<Vec<RelayTransaction>>().await else {
                continue;
            };
            let Some(record) = records.into_iter().next() else {
                continue;
            };

            if record.transaction_id.is_empty() {
                latest.state = record.state;
                latest.transaction_hash = record.transaction_hash;
            } else {
                latest = record;
            }

            match latest.state.as_str() {
                "STATE_MINED" | "STATE_CONFIRMED" => {
                    info!("Relay transaction confirmed: tx={}", latest.transaction_hash);
                    return Ok(latest);
                }
                "STATE_FAILED" | "STATE_INVALID" => {
                    bail!(
                        "Relay transaction {} ended in {} (hash={})",
                        latest.transaction_id,
                        latest.state,
                        latest.transaction_hash
                    );
                }
                state => {
                    if attempt % 5 == 1 {
                        debug!("Relay polling: state={}, attempt {}/{}", state, attempt, POLL_ATTEMPTS);
                    }
                }
            }
        }

        warn!(
            "Relay polling timed out for tx_id={} (last state {:?})",
            latest.transaction_id, latest.state
        );
        Ok(latest)
    }
}

/// Relay assignment for a PROXY transaction
#[derive(Debug, Clone, PartialEq, Eq)]
struct RelayPayload {
    relay: Address,
    nonce: String,
}

fn parse_relay_payload(json: serde_json::Value) -> Result<RelayPayload> {
    let relay = json["address"]
        .as_str()
        .with_context(|| format!("Relay payload missing address: {}", json))?
        .parse()
        .context("Invalid relay address")?;
    let nonce = nonce_string(json["nonce"].clone())?;
    Ok(RelayPayload { relay, nonce })
}

fn nonce_string(nonce: serde_json::Value) -> Result<String> {
    match nonce {
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::String(s) => Ok(s),
        other => bail!("Unexpected nonce format: {:?}", other),
    }
}

/// `ProxyFactory.proxy([{Call, to, 0, data}])`
pub fn proxy_calldata(to: Address, calldata: &[u8]) -> Vec<u8> {
    proxyCall {
        calls: vec![ProxyTransaction {
            typeCode: PROXY_CALL,
            to,
            value: U256::ZERO,
            data: Bytes::copy_from_slice(calldata),
        }],
    }
    .abi_encode()
}

/// Relay-hub hash of a zero-fee PROXY transaction:
/// keccak256("rlx:" ++ from ++ factory ++ data ++ fee ++ gasPrice ++ gasLimit ++ nonce ++ hub ++ relay)
pub fn proxy_struct_hash(
    from: Address,
    data: &[u8],
    gas_limit: u64,
    nonce: &str,
    relay: Address,
) -> Result<B256> {
    let nonce = U256::from_str_radix(nonce, 10).with_context(|| format!("Invalid relay nonce {:?}", nonce))?;

    let mut preimage = Vec::with_capacity(4 + 20 + 20 + data.len() + 4 * 32 + 40);
    preimage.extend_from_slice(b"rlx:");
    preimage.extend_from_slice(from.as_slice());
    preimage.extend_from_slice(PROXY_FACTORY.as_slice());
    preimage.extend_from_slice(data);
    preimage.extend_from_slice(&[0u8; 32]); // relayer fee
    preimage.extend_from_slice(&[0u8; 32]); // gas price
    preimage.extend_from_slice(&U256::from(gas_limit).to_be_bytes::<32>());
    preimage.extend_from_slice(&nonce.to_be_bytes::<32>());
    preimage.extend_from_slice(RELAY_HUB.as_slice());
    preimage.extend_from_slice(relay.as_slice());

    Ok(keccak256(&preimage))
}

/// EIP-712 hash of a zero-gas Safe `Call` transaction
pub fn safe_tx_hash(chain_id: u64, safe: Address, to: Address, data: &[u8], nonce: &str) -> Result<B256> {
    let nonce = U256::from_str_radix(nonce, 10).with_context(|| format!("Invalid relay nonce {:?}", nonce))?;

    // Domain separator: keccak256(abi.encode(typehash, chainId, verifyingContract))
    let domain_typehash = keccak256(b"EIP712Domain(uint256 chainId,address verifyingContract)");
    let mut domain_data = Vec::with_capacity(96);
    domain_data.extend_from_slice(domain_typehash.as_slice());
    domain_data.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    domain_data.extend_from_slice(safe.into_word().as_slice());
    let domain_separator = keccak256(&domain_data);

    let safe_tx_typehash = keccak256(
        b"SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)",
    );

    // typehash + 10 words
    let zero = [0u8; 32];
    let mut struct_data = Vec::with_capacity(352);
    struct_data.extend_from_slice(safe_tx_typehash.as_slice());
    struct_data.extend_from_slice(to.into_word().as_slice());
    struct_data.extend_from_slice(&zero); // value
    struct_data.extend_from_slice(keccak256(data).as_slice());
    struct_data.extend_from_slice(&zero); // operation = Call
    struct_data.extend_from_slice(&zero); // safeTxGas
    struct_data.extend_from_slice(&zero); // baseGas
    struct_data.extend_from_slice(&zero); // gasPrice
    struct_data.extend_from_slice(&zero); // gasToken
    struct_data.extend_from_slice(&zero); // refundReceiver
    struct_data.extend_from_slice(&nonce.to_be_bytes::<32>());
    let struct_hash = keccak256(&struct_data);

    let mut final_data = Vec::with_capacity(66);
    final_data.extend_from_slice(&[0x19, 0x01]);
    final_data.extend_from_slice(domain_separator.as_slice());
    final_data.extend_from_slice(struct_hash.as_slice());

    Ok(keccak256(&final_data))
}

/// HMAC-SHA256 over `payload` keyed by the base64 builder secret, URL-safe base64 output
pub fn builder_signature(secret: &str, payload: &str) -> Result<String> {
    let secret_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(secret)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(secret))
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(secret))
        .context("Failed to decode builder secret")?;

    let mut mac = HmacSha256::new_from_slice(&secret_bytes).context("Invalid HMAC key")?;
    mac.update(payload.as_bytes());
    Ok(base64::engine::general_purpose::URL_SAFE.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_signature_is_deterministic() {
        let secret = base64::engine::general_purpose::URL_SAFE.encode(b"builder-secret-bytes");
        let a = builder_signature(&secret, "1700000000POST/submit{}").unwrap();
        let b = builder_signature(&secret, "1700000000POST/submit{}").unwrap();
        let c = builder_signature(&secret, "1700000001POST/submit{}").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        // 32-byte MAC -> 44 chars of padded base64
        assert_eq!(a.len(), 44);
    }

    #[test]
    fn test_builder_signature_rejects_garbage_secret() {
        assert!(builder_signature("not base64 at all!!", "payload").is_err());
    }

    #[test]
    fn test_safe_tx_hash_depends_on_every_input() {
        let safe = address!("1111111111111111111111111111111111111111");
        let to = address!("4d97dcd97ec945f40cf65f87097ace5ea0476045");
        let base = safe_tx_hash(137, safe, to, b"\x01\x02", "7").unwrap();

        assert_eq!(base, safe_tx_hash(137, safe, to, b"\x01\x02", "7").unwrap());
        assert_ne!(base, safe_tx_hash(80002, safe, to, b"\x01\x02", "7").unwrap());
        assert_ne!(base, safe_tx_hash(137, safe, to, b"\x01\x03", "7").unwrap());
        assert_ne!(base, safe_tx_hash(137, safe, to, b"\x01\x02", "8").unwrap());
    }

    #[test]
    fn test_safe_tx_hash_rejects_bad_nonce() {
        let safe = Address::ZERO;
        assert!(safe_tx_hash(137, safe, safe, &[], "abc").is_err());
    }

    #[test]
    fn test_proxy_calldata_wraps_single_call() {
        let target = address!("4d97dcd97ec945f40cf65f87097ace5ea0476045");
        let data = proxy_calldata(target, &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(
            &data[..4],
            &keccak256(b"proxy((uint8,address,uint256,bytes)[])")[..4]
        );

        let decoded = proxyCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.calls.len(), 1);
        assert_eq!(decoded.calls[0].typeCode, 1);
        assert_eq!(decoded.calls[0].to, target);
        assert_eq!(decoded.calls[0].value, U256::ZERO);
        assert_eq!(decoded.calls[0].data.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_proxy_struct_hash_layout() {
        let from = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let relay = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
        let data = [0x01u8, 0x02];

        let mut expected = b"rlx:".to_vec();
        expected.extend_from_slice(from.as_slice());
        expected.extend_from_slice(PROXY_FACTORY.as_slice());
        expected.extend_from_slice(&data);
        expected.extend_from_slice(&[0u8; 64]);
        expected.extend_from_slice(&U256::from(10_000_000u64).to_be_bytes::<32>());
        expected.extend_from_slice(&U256::from(42u64).to_be_bytes::<32>());
        expected.extend_from_slice(RELAY_HUB.as_slice());
        expected.extend_from_slice(relay.as_slice());

        let hash = proxy_struct_hash(from, &data, 10_000_000, "42", relay).unwrap();
        assert_eq!(hash, keccak256(&expected));
        assert_ne!(hash, proxy_struct_hash(from, &data, 10_000_000, "43", relay).unwrap());
        assert!(proxy_struct_hash(from, &data, 10_000_000, "x", relay).is_err());
    }

    #[test]
    fn test_parse_relay_payload() {
        let payload = parse_relay_payload(json!({
            "address": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
            "nonce": "17"
        }))
        .unwrap();
        assert_eq!(payload.relay, address!("70997970C51812dc3A010C7d01b50e0d17dc79C8"));
        assert_eq!(payload.nonce, "17");

        let numeric = parse_relay_payload(json!({"address": format!("{:?}", RELAY_HUB), "nonce": 3})).unwrap();
        assert_eq!(numeric.nonce, "3");

        assert!(parse_relay_payload(json!({"nonce": "1"})).is_err());
        assert!(parse_relay_payload(json!({"address": "0x01", "nonce": "1"})).is_err());
        assert!(parse_relay_payload(json!({"address": format!("{:?}", RELAY_HUB)})).is_err());
    }

    #[test]
    fn test_relay_transaction_parses_relay_fields() {
        let body = r#"[{"transactionID":"0192-abc","transactionHash":"0xfeed","state":"STATE_MINED","from":"0x1"}]"#;
        let records: Vec<RelayTransaction> = serde_json::from_str(body).unwrap();
        assert_eq!(records[0].transaction_id, "0192-abc");
        assert_eq!(records[0].transaction_hash, "0xfeed");
        assert_eq!(records[0].state, "STATE_MINED");
    }
}
