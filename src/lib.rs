//! Polymarket operational tools
//!
//! Two independent command-line utilities:
//!
//! 1. **Oracle cross-check** (`oracle-compare`): replays reference-source
//!    candles against the Pyth Hermes price history and reports how often the
//!    two agree on direction.
//!
//! 2. **Position redemption** (`redeem`): checks a CTF condition for resolution
//!    and redeemable balance, redeems through the builder relay and prints a
//!    single JSON outcome for the calling process.

pub mod config;
pub mod error;
pub mod services;
pub mod types;

pub use config::{Baseline, CompareConfig, RedeemCredentials, RedeemEndpoints, WalletKind};
pub use error::{CompareError, ConfigError, OracleError};
pub use types::{Direction, PredictionSample, RedeemOutcome, RedeemReport, RedemptionRequest, RelayTransaction};
