//! Service configuration from the environment.
//!
//! Everything is read once at startup into a typed struct; request handlers
//! never touch the environment. Secrets are held in `SecretString` so they
//! cannot leak through `Debug` output.

use secrecy::SecretString;
use thiserror::Error;

use beats_core::keys::{AnchorSecret, KeyError};

/// Environment variable holding the base58 writer secret.
pub const ANCHOR_KEYPAIR_VAR: &str = "BEATS_ANCHOR_KEYPAIR";

/// Environment variable holding the cron bearer credential.
pub const CRON_SECRET_VAR: &str = "CRON_SECRET";

/// Environment variable holding the ledger RPC endpoint.
pub const RPC_URL_VAR: &str = "NEXT_PUBLIC_SOLANA_RPC_URL";

/// Environment variable holding the pro-tier bearer token.
pub const PRO_TIER_TOKEN_VAR: &str = "BEATS_PRO_TIER_TOKEN";

/// RPC endpoint used when none is configured.
pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";

/// Header carrying the pro-tier token on timestamp requests.
pub const TIER_TOKEN_HEADER: &str = "x-beats-tier-token";

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The writer secret is not set.
    #[error("{ANCHOR_KEYPAIR_VAR} is not set")]
    MissingAnchorKeypair,

    /// The writer secret did not decode.
    #[error("{ANCHOR_KEYPAIR_VAR} is invalid: {0}")]
    BadAnchorKeypair(#[from] KeyError),
}

/// Ledger cluster, inferred from the RPC URL for explorer links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cluster {
    /// Development cluster.
    Devnet,
    /// Test cluster.
    Testnet,
    /// Production cluster.
    MainnetBeta,
}

impl Cluster {
    /// Infers the cluster from an RPC URL substring.
    #[must_use]
    pub fn from_rpc_url(url: &str) -> Self {
        if url.contains("devnet") {
            Self::Devnet
        } else if url.contains("testnet") {
            Self::Testnet
        } else {
            Self::MainnetBeta
        }
    }

    /// Explorer link for a transaction on this cluster.
    #[must_use]
    pub fn explorer_url(self, signature: &str) -> String {
        match self {
            Self::Devnet => {
                format!("https://explorer.solana.com/tx/{signature}?cluster=devnet")
            },
            Self::Testnet => {
                format!("https://explorer.solana.com/tx/{signature}?cluster=testnet")
            },
            Self::MainnetBeta => format!("https://explorer.solana.com/tx/{signature}"),
        }
    }
}

/// Runtime configuration.
pub struct Config {
    /// Ledger RPC endpoint.
    pub rpc_url: String,

    /// Cluster the endpoint points at.
    pub cluster: Cluster,

    /// Cron bearer credential; the cron endpoint refuses to run without it.
    pub cron_secret: Option<SecretString>,

    /// Token granting raised timestamp quotas.
    pub pro_tier_token: Option<SecretString>,
}

impl Config {
    /// Loads configuration and the anchor secret from the environment.
    ///
    /// # Errors
    ///
    /// Fails when the writer secret is missing or malformed. A missing cron
    /// secret is not an error here; the cron endpoint reports it per-request.
    pub fn from_env() -> Result<(Self, AnchorSecret), ConfigError> {
        let encoded =
            std::env::var(ANCHOR_KEYPAIR_VAR).map_err(|_| ConfigError::MissingAnchorKeypair)?;
        let secret = AnchorSecret::from_base58(&encoded)?;

        let rpc_url =
            std::env::var(RPC_URL_VAR).unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());
        let cluster = Cluster::from_rpc_url(&rpc_url);

        let cron_secret = std::env::var(CRON_SECRET_VAR)
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);
        let pro_tier_token = std::env::var(PRO_TIER_TOKEN_VAR)
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        if cron_secret.is_none() {
            tracing::warn!("{CRON_SECRET_VAR} is not set; the cron endpoint will refuse to run");
        }

        Ok((
            Self {
                rpc_url,
                cluster,
                cron_secret,
                pro_tier_token,
            },
            secret,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_inference() {
        assert_eq!(
            Cluster::from_rpc_url("https://api.devnet.solana.com"),
            Cluster::Devnet
        );
        assert_eq!(
            Cluster::from_rpc_url("https://api.testnet.solana.com"),
            Cluster::Testnet
        );
        assert_eq!(
            Cluster::from_rpc_url("https://api.mainnet-beta.solana.com"),
            Cluster::MainnetBeta
        );
        assert_eq!(
            Cluster::from_rpc_url("https://rpc.example.com"),
            Cluster::MainnetBeta
        );
    }

    #[test]
    fn explorer_urls_carry_the_cluster() {
        assert_eq!(
            Cluster::Devnet.explorer_url("sig1"),
            "https://explorer.solana.com/tx/sig1?cluster=devnet"
        );
        assert_eq!(
            Cluster::MainnetBeta.explorer_url("sig1"),
            "https://explorer.solana.com/tx/sig1"
        );
    }
}
