//! Services behind the two command-line tools

pub mod clob;
pub mod comparator;
pub mod ctf;
pub mod hermes;
pub mod redemption;
pub mod relay;
pub mod safe_proxy;

pub use clob::{ApiCredentials, ClobSession};
pub use comparator::{load_records, ComparisonResult, ComparisonRun, OracleComparator, Progress, Tally};
pub use ctf::CtfRedeemService;
pub use hermes::{HermesClient, PriceOracle};
pub use redemption::{run_redemption, BalanceCheckFallback, RedemptionService};
pub use relay::RelayClient;
