//! Chain-aware RPC facade.
//!
//! One lazily-built `Provider<Http>` per configured chain, plus the server's
//! HD settler key derived once at startup. Every outbound call carries a
//! deadline.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{coins_bip39::English, LocalWallet, MnemonicBuilder, Signer};
use ethers::types::{Address, BlockNumber, Bytes, TransactionReceipt, H256, U256};
use tokio::time::{sleep, timeout, Instant};

use crate::constants::{RECEIPT_POLL_MILLIS, RPC_TIMEOUT_SECS};
use crate::error::{AppError, Result};

fn deadline() -> Duration {
    Duration::from_secs(RPC_TIMEOUT_SECS)
}

pub struct BlockchainClient {
    rpc_urls: HashMap<u64, String>,
    providers: RwLock<HashMap<u64, Arc<Provider<Http>>>>,
    wallet: LocalWallet,
}

impl BlockchainClient {
    /// Derives the settler wallet from the mnemonic (BIP-44 account 0) and
    /// records the configured RPC endpoints. Providers are built on first use.
    pub fn new(rpc_urls: HashMap<u64, String>, mnemonic: &str) -> anyhow::Result<Self> {
        let wallet = MnemonicBuilder::<English>::default()
            .phrase(mnemonic)
            .build()?;
        Ok(Self {
            rpc_urls,
            providers: RwLock::new(HashMap::new()),
            wallet,
        })
    }

    /// Address authorized as the escrow's settler.
    pub fn settler_address(&self) -> Address {
        self.wallet.address()
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        self.rpc_urls.keys().copied().collect()
    }

    /// Signer bound to `chain_id` for EIP-155 signatures.
    pub fn signer(&self, chain_id: u64) -> Result<LocalWallet> {
        if !self.rpc_urls.contains_key(&chain_id) {
            return Err(AppError::UnsupportedChain(chain_id));
        }
        Ok(self.wallet.clone().with_chain_id(chain_id))
    }

    pub fn provider(&self, chain_id: u64) -> Result<Arc<Provider<Http>>> {
        if let Some(provider) = self.providers.read().expect("provider lock").get(&chain_id) {
            return Ok(provider.clone());
        }
        let url = self
            .rpc_urls
            .get(&chain_id)
            .ok_or(AppError::UnsupportedChain(chain_id))?;
        let provider = Arc::new(
            Provider::<Http>::try_from(url.as_str())
                .map_err(|e| AppError::Chain(format!("invalid RPC url for {chain_id}: {e}")))?,
        );
        self.providers
            .write()
            .expect("provider lock")
            .insert(chain_id, provider.clone());
        Ok(provider)
    }

    pub async fn get_block_number(&self, chain_id: u64) -> Result<u64> {
        let provider = self.provider(chain_id)?;
        let number = timeout(deadline(), provider.get_block_number())
            .await
            .map_err(|_| AppError::Chain("eth_blockNumber timed out".into()))?
            .map_err(|e| AppError::Chain(e.to_string()))?;
        Ok(number.as_u64())
    }

    pub async fn get_balance(&self, addr: Address, chain_id: u64) -> Result<U256> {
        let provider = self.provider(chain_id)?;
        timeout(deadline(), provider.get_balance(addr, None))
            .await
            .map_err(|_| AppError::Chain("eth_getBalance timed out".into()))?
            .map_err(|e| AppError::Chain(e.to_string()))
    }

    pub async fn get_pending_nonce(&self, addr: Address, chain_id: u64) -> Result<U256> {
        let provider = self.provider(chain_id)?;
        timeout(
            deadline(),
            provider.get_transaction_count(addr, Some(BlockNumber::Pending.into())),
        )
        .await
        .map_err(|_| AppError::Chain("eth_getTransactionCount timed out".into()))?
        .map_err(|e| AppError::Chain(e.to_string()))
    }

    pub async fn broadcast_signed(&self, raw: Bytes, chain_id: u64) -> Result<H256> {
        let provider = self.provider(chain_id)?;
        let pending = timeout(deadline(), provider.send_raw_transaction(raw))
            .await
            .map_err(|_| AppError::Chain("eth_sendRawTransaction timed out".into()))?
            .map_err(|e| AppError::Chain(e.to_string()))?;
        Ok(*pending)
    }

    /// Polls for the receipt until the overall deadline elapses.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        chain_id: u64,
    ) -> Result<TransactionReceipt> {
        let provider = self.provider(chain_id)?;
        let started = Instant::now();
        loop {
            let receipt = timeout(deadline(), provider.get_transaction_receipt(tx_hash))
                .await
                .map_err(|_| AppError::Chain("eth_getTransactionReceipt timed out".into()))?
                .map_err(|e| AppError::Chain(e.to_string()))?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            if started.elapsed() >= deadline() {
                return Err(AppError::Chain(format!(
                    "no receipt for {tx_hash:?} within {RPC_TIMEOUT_SECS}s"
                )));
            }
            sleep(Duration::from_millis(RECEIPT_POLL_MILLIS)).await;
        }
    }

    /// One block-number probe per configured chain.
    pub async fn validate_connectivity(&self) -> HashMap<u64, bool> {
        let mut out = HashMap::new();
        for chain_id in self.chain_ids() {
            let ok = self.get_block_number(chain_id).await.is_ok();
            out.insert(chain_id, ok);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CHAIN_ID_SEPOLIA;

    const TEST_MNEMONIC: &str =
        "test test test test test test test test test test test junk";

    fn client() -> BlockchainClient {
        let mut urls = HashMap::new();
        urls.insert(CHAIN_ID_SEPOLIA, "http://localhost:8545".to_string());
        BlockchainClient::new(urls, TEST_MNEMONIC).unwrap()
    }

    #[test]
    fn settler_address_is_deterministic_for_mnemonic() {
        // First account of the canonical test mnemonic.
        let expected: Address = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
            .parse()
            .unwrap();
        assert_eq!(client().settler_address(), expected);
    }

    #[test]
    fn unknown_chain_is_rejected() {
        let client = client();
        assert!(matches!(
            client.provider(1),
            Err(AppError::UnsupportedChain(1))
        ));
        assert!(matches!(
            client.signer(1),
            Err(AppError::UnsupportedChain(1))
        ));
    }

    #[test]
    fn signer_carries_requested_chain_id() {
        let signer = client().signer(CHAIN_ID_SEPOLIA).unwrap();
        assert_eq!(signer.chain_id(), CHAIN_ID_SEPOLIA);
    }

    #[test]
    fn provider_is_cached_per_chain() {
        let client = client();
        let first = client.provider(CHAIN_ID_SEPOLIA).unwrap();
        let second = client.provider(CHAIN_ID_SEPOLIA).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn invalid_mnemonic_fails_at_startup() {
        let mut urls = HashMap::new();
        urls.insert(CHAIN_ID_SEPOLIA, "http://localhost:8545".to_string());
        assert!(BlockchainClient::new(urls, "not a real phrase").is_err());
    }
}
