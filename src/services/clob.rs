//! CLOB API session for the redeeming wallet

use crate::config::{RedeemCredentials, RedeemEndpoints};
use alloy::primitives::Address;
use alloy::signers::{local::PrivateKeySigner, Signer};
use anyhow::{Context, Result};
use polymarket_client_sdk::auth::ExposeSecret;
use polymarket_client_sdk::clob::{Client as ClobClient, Config as ClobConfig};
use std::fmt;
use tracing::{debug, info, warn};

/// L2 API credentials for the CLOB
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

/// Signer plus the API credentials the CLOB recognizes for it
pub struct ClobSession {
    signer: PrivateKeySigner,
    creds: ApiCredentials,
}

impl ClobSession {
    /// Parse the signer and derive its API credentials.
    ///
    /// The configured credentials are replaced by whatever the CLOB returns for
    /// this key; a different API key is logged, since it means the configured
    /// set belongs to another wallet or was rotated.
    pub async fn connect(creds: &RedeemCredentials, endpoints: &RedeemEndpoints) -> Result<Self> {
        let signer: PrivateKeySigner = creds
            .private_key
            .parse()
            .context("Failed to parse private key")?;
        let signer = signer.with_chain_id(Some(endpoints.chain_id));

        let mut session = Self {
            signer,
            creds: ApiCredentials {
                api_key: creds.api_key.clone(),
                secret: creds.api_secret.clone(),
                passphrase: creds.passphrase.clone(),
            },
        };

        let derived = session.create_or_derive_api_creds(endpoints).await?;
        if derived.api_key != session.creds.api_key {
            warn!(
                "Configured CLOB API key differs from the key derived for {:?}; using the derived key",
                session.address()
            );
        }
        session.set_api_creds(derived);

        Ok(session)
    }

    /// Create API credentials for the signer, or derive the existing ones
    pub async fn create_or_derive_api_creds(&self, endpoints: &RedeemEndpoints) -> Result<ApiCredentials> {
        debug!("Deriving CLOB API credentials for {:?}", self.address());

        let clob_config = ClobConfig::builder().use_server_time(true).build();
        let client = ClobClient::new(endpoints.clob_host.as_str(), clob_config)
            .context("Failed to create CLOB client")?;

        let creds = client
            .create_or_derive_api_key(&self.signer, None)
            .await
            .context("Failed to create or derive CLOB API credentials")?;

        info!("CLOB API credentials ready for {:?}", self.address());
        Ok(ApiCredentials {
            api_key: creds.key().to_string(),
            secret: creds.secret().expose_secret().to_string(),
            passphrase: creds.passphrase().expose_secret().to_string(),
        })
    }

    pub fn set_api_creds(&mut self, creds: ApiCredentials) {
        self.creds = creds;
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}
