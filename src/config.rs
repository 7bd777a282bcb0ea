//! Configuration for the oracle comparator and the redemption invoker

use crate::error::ConfigError;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Pyth Hermes BTC/USD price feed
pub const DEFAULT_ASSET_ID: &str =
    "0xe62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43";

/// Prior agreement campaign folded into the cumulative figure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub matched: u64,
    pub total: u64,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            matched: 10,
            total: 10,
        }
    }
}

/// Oracle comparator settings
#[derive(Debug, Clone)]
pub struct CompareConfig {
    /// Hermes base URL (no trailing slash)
    pub base_url: String,

    /// Price feed id queried for every sample
    pub asset_id: String,

    /// Seconds between the open and close observation
    pub close_offset_secs: i64,

    /// Pause after every oracle request
    pub request_pause: Duration,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// User-Agent header required by the oracle's access policy
    pub user_agent: String,

    /// Historical tally added to the cumulative figure
    pub baseline: Baseline,

    /// JSON array of prediction samples
    pub samples_path: String,

    /// Plain-text report, overwritten each run
    pub report_path: String,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            base_url: "https://hermes.pyth.network".to_string(),
            asset_id: DEFAULT_ASSET_ID.to_string(),
            close_offset_secs: 300,
            request_pause: Duration::from_millis(300),
            request_timeout: Duration::from_secs(20),
            user_agent: "Mozilla/5.0".to_string(),
            baseline: Baseline::default(),
            samples_path: "/tmp/pyth_samples.json".to_string(),
            report_path: "/tmp/pyth_result.txt".to_string(),
        }
    }
}

impl CompareConfig {
    /// Load comparator settings from the environment, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|s| !s.is_empty());
        let defaults = Self::default();

        let request_pause = match lookup("ORACLE_REQUEST_PAUSE_MS") {
            Some(v) => Duration::from_millis(parse_var("ORACLE_REQUEST_PAUSE_MS", &v)?),
            None => defaults.request_pause,
        };

        let request_timeout = match lookup("ORACLE_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_var("ORACLE_TIMEOUT_SECS", &v)?),
            None => defaults.request_timeout,
        };

        let close_offset_secs = match lookup("ORACLE_CLOSE_OFFSET_SECS") {
            Some(v) => parse_var("ORACLE_CLOSE_OFFSET_SECS", &v)?,
            None => defaults.close_offset_secs,
        };

        let baseline = Baseline {
            matched: match lookup("ORACLE_BASELINE_MATCHED") {
                Some(v) => parse_var("ORACLE_BASELINE_MATCHED", &v)?,
                None => defaults.baseline.matched,
            },
            total: match lookup("ORACLE_BASELINE_TOTAL") {
                Some(v) => parse_var("ORACLE_BASELINE_TOTAL", &v)?,
                None => defaults.baseline.total,
            },
        };

        if baseline.matched > baseline.total {
            return Err(ConfigError::InvalidValue {
                name: "ORACLE_BASELINE_MATCHED".to_string(),
                reason: format!(
                    "baseline matches ({}) exceed baseline total ({})",
                    baseline.matched, baseline.total
                ),
            });
        }

        Ok(Self {
            base_url: lookup("ORACLE_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            asset_id: lookup("ORACLE_ASSET_ID").unwrap_or(defaults.asset_id),
            close_offset_secs,
            request_pause,
            request_timeout,
            user_agent: lookup("ORACLE_USER_AGENT").unwrap_or(defaults.user_agent),
            baseline,
            samples_path: lookup("ORACLE_SAMPLES_PATH").unwrap_or(defaults.samples_path),
            report_path: lookup("ORACLE_REPORT_PATH").unwrap_or(defaults.report_path),
        })
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Environment variables the redemption invoker refuses to run without
pub const REQUIRED_REDEEM_VARS: [&str; 8] = [
    "POLY_PRIVATE_KEY",
    "POLY_API_KEY",
    "POLY_API_SECRET",
    "POLY_PASSPHRASE",
    "POLY_PROXY_ADDRESS",
    "BUILDER_API_KEY",
    "BUILDER_SECRET",
    "BUILDER_PASSPHRASE",
];

/// How the funder wallet executes transactions through the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalletKind {
    /// Polymarket proxy wallet (CLOB signature type 1)
    #[default]
    Proxy,
    /// Gnosis Safe (CLOB signature type 2)
    Safe,
}

impl WalletKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletKind::Proxy => "PROXY",
            WalletKind::Safe => "SAFE",
        }
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletKind {
    type Err = String;

    /// Accepts the kind name or the CLOB signature type number
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proxy" | "1" => Ok(WalletKind::Proxy),
            "safe" | "gnosis-safe" | "2" => Ok(WalletKind::Safe),
            other => Err(format!("unknown wallet type {:?} (expected proxy or safe)", other)),
        }
    }
}

/// Builder API credentials used to authenticate with the relay service
#[derive(Clone)]
pub struct BuilderCredentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl fmt::Debug for BuilderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderCredentials")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// Validated credential bundle for redemption.
///
/// Built once at startup; construction fails with every missing name at once.
#[derive(Clone)]
pub struct RedeemCredentials {
    /// EOA private key (signs relay transactions and CLOB auth)
    pub private_key: String,
    /// CLOB API key
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
    /// Wallet holding the positions (funder)
    pub proxy_address: String,
    /// Kind of the funder wallet, from `POLY_WALLET_TYPE`
    pub wallet_kind: WalletKind,
    pub builder: BuilderCredentials,
}

impl fmt::Debug for RedeemCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedeemCredentials")
            .field("private_key", &"<redacted>")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .field("proxy_address", &self.proxy_address)
            .field("wallet_kind", &self.wallet_kind)
            .field("builder", &self.builder)
            .finish()
    }
}

impl RedeemCredentials {
    /// Load credentials from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build credentials from an arbitrary lookup. Empty values count as missing.
    ///
    /// `POLY_WALLET_TYPE` is optional and defaults to the proxy wallet.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let values: Vec<Option<String>> = REQUIRED_REDEEM_VARS
            .iter()
            .map(|name| lookup(name).filter(|v| !v.is_empty()))
            .collect();

        let missing: Vec<String> = REQUIRED_REDEEM_VARS
            .iter()
            .zip(&values)
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| name.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(ConfigError::MissingEnvVars(missing));
        }

        let wallet_kind = match lookup("POLY_WALLET_TYPE").filter(|v| !v.is_empty()) {
            Some(v) => parse_var("POLY_WALLET_TYPE", &v)?,
            None => WalletKind::default(),
        };

        let mut values = values.into_iter().flatten();
        let mut next = || values.next().unwrap_or_default();

        Ok(Self {
            private_key: next(),
            api_key: next(),
            api_secret: next(),
            passphrase: next(),
            proxy_address: next(),
            wallet_kind,
            builder: BuilderCredentials {
                api_key: next(),
                secret: next(),
                passphrase: next(),
            },
        })
    }
}

/// Remote endpoints used during redemption
#[derive(Debug, Clone)]
pub struct RedeemEndpoints {
    pub clob_host: String,
    pub relayer_url: String,
    pub polygon_rpc_url: String,
    pub chain_id: u64,
}

impl Default for RedeemEndpoints {
    fn default() -> Self {
        Self {
            clob_host: "https://clob.polymarket.com".to_string(),
            relayer_url: "https://relayer-v2.polymarket.com".to_string(),
            polygon_rpc_url: "https://polygon-rpc.com".to_string(),
            chain_id: 137,
        }
    }
}

impl RedeemEndpoints {
    /// Defaults with optional `CLOB_HOST`, `RELAYER_URL` and `POLYGON_RPC_URL` overrides
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|s| !s.is_empty());

        Self {
            clob_host: var("CLOB_HOST").unwrap_or(defaults.clob_host),
            relayer_url: var("RELAYER_URL").unwrap_or(defaults.relayer_url),
            polygon_rpc_url: var("POLYGON_RPC_URL").unwrap_or(defaults.polygon_rpc_url),
            chain_id: defaults.chain_id,
        }
    }
}
