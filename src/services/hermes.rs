//! Pyth Hermes historical price client
//!
//! Hermes serves the price update published at a given timestamp. Prices come
//! back as an integer mantissa plus a power-of-ten exponent and are decoded
//! into an exact `Decimal`.

use crate::config::CompareConfig;
use crate::error::OracleError;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

/// Source of historical prices keyed by unix timestamp
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Price published at `ts` (seconds since epoch)
    async fn price_at(&self, ts: i64) -> Result<Decimal, OracleError>;
}

/// Raw Hermes `/v2/updates/price/{ts}` response
#[derive(Debug, Deserialize)]
struct PriceUpdateResponse {
    #[serde(default)]
    parsed: Vec<ParsedUpdate>,
}

#[derive(Debug, Deserialize)]
struct ParsedUpdate {
    price: RawPrice,
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    /// Integer mantissa, sent as a string
    price: String,
    expo: i32,
}

/// HTTP client for the Hermes price service
pub struct HermesClient {
    client: Client,
    base_url: String,
    asset_id: String,
}

impl HermesClient {
    pub fn new(config: &CompareConfig) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            asset_id: config.asset_id.clone(),
        })
    }

    fn update_url(&self, ts: i64) -> String {
        format!(
            "{}/v2/updates/price/{}?ids[]={}",
            self.base_url, ts, self.asset_id
        )
    }
}

#[async_trait]
impl PriceOracle for HermesClient {
    async fn price_at(&self, ts: i64) -> Result<Decimal, OracleError> {
        let url = self.update_url(ts);
        debug!("Fetching oracle price from: {}", url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status { status, body });
        }

        let update: PriceUpdateResponse = response.json().await?;
        let price = first_price(update)?;
        debug!("Oracle price at {}: {}", ts, price);
        Ok(price)
    }
}

fn first_price(update: PriceUpdateResponse) -> Result<Decimal, OracleError> {
    let parsed = update
        .parsed
        .into_iter()
        .next()
        .ok_or(OracleError::EmptyResponse)?;
    decode_price(&parsed.price.price, parsed.price.expo)
}

/// Decode `mantissa × 10^expo` without going through floating point.
pub fn decode_price(mantissa: &str, expo: i32) -> Result<Decimal, OracleError> {
    let mantissa_int: i128 = mantissa
        .trim()
        .parse()
        .map_err(|_| OracleError::InvalidMantissa(mantissa.to_string()))?;

    if expo <= 0 {
        let scale = expo.unsigned_abs();
        Decimal::try_from_i128_with_scale(mantissa_int, scale)
            .map_err(|_| OracleError::ExponentOutOfRange(expo))
    } else {
        let base = Decimal::try_from_i128_with_scale(mantissa_int, 0)
            .map_err(|_| OracleError::InvalidMantissa(mantissa.to_string()))?;
        let factor = 10i64
            .checked_pow(expo.unsigned_abs())
            .ok_or(OracleError::ExponentOutOfRange(expo))?;
        base.checked_mul(Decimal::from(factor))
            .ok_or(OracleError::ExponentOutOfRange(expo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_negative_exponent() {
        assert_eq!(decode_price("9712345678901", -8).unwrap(), dec!(97123.45678901));
        assert_eq!(decode_price("-150", -2).unwrap(), dec!(-1.50));
    }

    #[test]
    fn test_decode_zero_and_positive_exponent() {
        assert_eq!(decode_price("42", 0).unwrap(), dec!(42));
        assert_eq!(decode_price("42", 3).unwrap(), dec!(42000));
    }

    #[test]
    fn test_decode_keeps_every_digit() {
        // 19 significant digits would lose precision as f64
        let price = decode_price("1234567890123456789", -10).unwrap();
        assert_eq!(price.to_string(), "123456789.0123456789");
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(matches!(
            decode_price("12.5", -2),
            Err(OracleError::InvalidMantissa(_))
        ));
        assert!(matches!(
            decode_price("1", -40),
            Err(OracleError::ExponentOutOfRange(-40))
        ));
        assert!(matches!(
            decode_price("1", 30),
            Err(OracleError::ExponentOutOfRange(30))
        ));
    }

    #[test]
    fn test_parse_hermes_response() {
        let body = r#"{
            "binary": {"encoding": "hex", "data": []},
            "parsed": [{
                "id": "e62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43",
                "price": {"price": "6512345000000", "conf": "3000000", "expo": -8, "publish_time": 1700000000},
                "ema_price": {"price": "6510000000000", "conf": "3000000", "expo": -8, "publish_time": 1700000000}
            }]
        }"#;
        let update: PriceUpdateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(first_price(update).unwrap(), dec!(65123.45));
    }

    #[test]
    fn test_empty_response() {
        let update: PriceUpdateResponse = serde_json::from_str(r#"{"parsed": []}"#).unwrap();
        assert!(matches!(first_price(update), Err(OracleError::EmptyResponse)));
    }

    #[test]
    fn test_update_url() {
        let config = CompareConfig {
            base_url: "https://hermes.example".to_string(),
            asset_id: "0xabc".to_string(),
            ..Default::default()
        };
        let client = HermesClient::new(&config).unwrap();
        assert_eq!(
            client.update_url(1700000000),
            "https://hermes.example/v2/updates/price/1700000000?ids[]=0xabc"
        );
    }
}
