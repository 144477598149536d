use std::collections::HashMap;
use std::env;

use crate::constants::{CHAIN_ID_BASE_SEPOLIA, CHAIN_ID_SEPOLIA};

#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Identity provider (Privy)
    pub privy_app_id: String,
    pub privy_app_secret: String,
    pub privy_verification_key: String,

    // Settler signing key
    pub mnemonic: String,

    // Per-chain RPC endpoints
    pub rpc_urls: HashMap<u64, String>,

    // Deployed escrow
    pub escrow_contract_address: String,
    pub escrow_chain_id: u64,
    /// When set, the poller replays escrow history from this block at boot.
    pub escrow_deploy_block: Option<u64>,

    // CORS
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let mut rpc_urls = HashMap::new();
        if let Ok(url) = env::var("SEPOLIA_RPC_URL") {
            if !url.trim().is_empty() {
                rpc_urls.insert(CHAIN_ID_SEPOLIA, url);
            }
        }
        if let Ok(url) = env::var("BASE_SEPOLIA_RPC_URL") {
            if !url.trim().is_empty() {
                rpc_urls.insert(CHAIN_ID_BASE_SEPOLIA, url);
            }
        }

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("APP_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            privy_app_id: env::var("PRIVY_APP_ID")?,
            privy_app_secret: env::var("PRIVY_APP_SECRET")?,
            privy_verification_key: env::var("PRIVY_VERIFICATION_KEY")?,

            mnemonic: env::var("MNEMONIC")?,

            rpc_urls,

            escrow_contract_address: env::var("ESCROW_CONTRACT_ADDRESS")?,
            escrow_chain_id: env::var("ESCROW_CHAIN_ID")
                .unwrap_or_else(|_| CHAIN_ID_SEPOLIA.to_string())
                .parse()?,
            escrow_deploy_block: env::var("ESCROW_DEPLOY_BLOCK")
                .ok()
                .and_then(|raw| raw.parse().ok()),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.privy_app_id.trim().is_empty() || self.privy_app_secret.trim().is_empty() {
            anyhow::bail!("Privy credentials are missing");
        }
        if self.privy_verification_key.trim().is_empty() {
            anyhow::bail!("PRIVY_VERIFICATION_KEY is empty");
        }
        if self.mnemonic.trim().is_empty() {
            anyhow::bail!("MNEMONIC is empty");
        }
        if self.rpc_urls.is_empty() {
            anyhow::bail!("No RPC endpoints configured (set SEPOLIA_RPC_URL / BASE_SEPOLIA_RPC_URL)");
        }
        if !self.rpc_urls.contains_key(&self.escrow_chain_id) {
            anyhow::bail!(
                "ESCROW_CHAIN_ID {} has no configured RPC endpoint",
                self.escrow_chain_id
            );
        }
        if self.escrow_contract_address.trim().is_empty() {
            anyhow::bail!("ESCROW_CONTRACT_ADDRESS is empty");
        }
        if !self.escrow_contract_address.starts_with("0x")
            || self.escrow_contract_address.len() != 42
        {
            anyhow::bail!("ESCROW_CONTRACT_ADDRESS is not a 20-byte hex address");
        }

        if self.escrow_contract_address.starts_with("0x0000") {
            tracing::warn!("Using placeholder escrow contract address");
        }
        if self.mnemonic.split_whitespace().count() < 12 {
            tracing::warn!("MNEMONIC has fewer than 12 words; is this a real seed phrase?");
        }
        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn is_testnet(&self) -> bool {
        self.environment == "development" || self.environment == "testnet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        let mut rpc_urls = HashMap::new();
        rpc_urls.insert(CHAIN_ID_SEPOLIA, "http://localhost:8545".to_string());
        Config {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: "testnet".to_string(),
            privy_app_id: "app".to_string(),
            privy_app_secret: "secret".to_string(),
            privy_verification_key: "-----BEGIN PUBLIC KEY-----".to_string(),
            mnemonic: "test test test test test test test test test test test junk".to_string(),
            rpc_urls,
            escrow_contract_address: format!("0x{}", "ab".repeat(20)),
            escrow_chain_id: CHAIN_ID_SEPOLIA,
            escrow_deploy_block: None,
            cors_allowed_origins: "*".to_string(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(sample_config().validate().is_ok());
        assert!(sample_config().is_testnet());
    }

    #[test]
    fn escrow_chain_must_have_rpc() {
        let mut config = sample_config();
        config.escrow_chain_id = CHAIN_ID_BASE_SEPOLIA;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_escrow_address_rejected() {
        let mut config = sample_config();
        config.escrow_contract_address = "0x1234".to_string();
        assert!(config.validate().is_err());
    }
}
