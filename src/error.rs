//! Typed errors at the module boundaries.
//!
//! Integration glue (HTTP, RPC, relay) uses `anyhow` with context; these types
//! cover the failures callers need to tell apart.

use thiserror::Error;

/// Configuration could not be assembled from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required variables are unset or empty. Names are listed
    /// in declaration order.
    #[error("Missing env vars: {}", .0.join(", "))]
    MissingEnvVars(Vec<String>),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// Failures while fetching or decoding an oracle price.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Oracle API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Oracle response had no parsed price update")]
    EmptyResponse,

    #[error("Invalid price mantissa {0:?}")]
    InvalidMantissa(String),

    #[error("Price exponent {0} cannot be represented exactly")]
    ExponentOutOfRange(i32),
}

/// Fatal outcomes of a comparison run.
#[derive(Debug, Error)]
pub enum CompareError {
    /// Every sample failed, so no agreement rate exists.
    #[error("No samples could be compared; agreement rate is undefined (0 of 0)")]
    NoComparableSamples,

    #[error("Failed to read samples from {path}: {source}")]
    ReadSamples {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Samples file {path} is not a JSON array: {source}")]
    ParseSamples {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write report to {path}: {source}")]
    WriteReport {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
