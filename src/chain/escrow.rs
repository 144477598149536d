//! Typed binding to the deployed escrow contract.

use std::sync::Arc;
use std::time::Duration;

use ethers::contract::LogMeta;
use ethers::middleware::SignerMiddleware;
use ethers::types::{Address, TransactionReceipt};
use tokio::time::timeout;

use crate::chain::client::BlockchainClient;
use crate::constants::RPC_TIMEOUT_SECS;
use crate::error::{AppError, Result};
use crate::models::parse_address;

ethers::contract::abigen!(
    ChessEscrow,
    r#"[
        event GameCreated(string gameId, bytes32 indexed gameIdHash, address indexed creator, uint256 wagerAmount)
        event GameJoined(string gameId, bytes32 indexed gameIdHash, address indexed joiner, uint256 wagerAmount)
        event GameSettled(bytes32 indexed gameIdHash, address indexed winner, uint256 totalWinnings)
        function getGame(string gameId) view returns (address creator, address opponent, uint256 wagerAmount, uint8 status)
        function settleGame(string gameId, address winner)
    ]"#
);

fn deadline() -> Duration {
    Duration::from_secs(RPC_TIMEOUT_SECS)
}

/// Keccak digest of a game id, matching the contract's indexed `gameIdHash`.
pub fn game_id_hash(game_id: &str) -> [u8; 32] {
    use sha3::{Digest, Keccak256};
    let mut hasher = Keccak256::new();
    hasher.update(game_id.as_bytes());
    hasher.finalize().into()
}

/// The one deployed escrow this server observes and settles against.
#[derive(Clone)]
pub struct Escrow {
    address: Address,
    chain_id: u64,
    client: Arc<BlockchainClient>,
}

impl Escrow {
    pub fn new(address: &str, chain_id: u64, client: Arc<BlockchainClient>) -> Result<Self> {
        Ok(Self {
            address: parse_address(address)?,
            chain_id,
            client,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub async fn current_block(&self) -> Result<u64> {
        self.client.get_block_number(self.chain_id).await
    }

    fn reader(&self) -> Result<ChessEscrow<ethers::providers::Provider<ethers::providers::Http>>> {
        Ok(ChessEscrow::new(
            self.address,
            self.client.provider(self.chain_id)?,
        ))
    }

    pub async fn fetch_created(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<(GameCreatedFilter, LogMeta)>> {
        let contract = self.reader()?;
        let query = contract
            .game_created_filter()
            .from_block(from_block)
            .to_block(to_block);
        timeout(deadline(), query.query_with_meta())
            .await
            .map_err(|_| AppError::Chain("GameCreated log query timed out".into()))?
            .map_err(|e| AppError::Chain(e.to_string()))
    }

    pub async fn fetch_joined(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<(GameJoinedFilter, LogMeta)>> {
        let contract = self.reader()?;
        let query = contract
            .game_joined_filter()
            .from_block(from_block)
            .to_block(to_block);
        timeout(deadline(), query.query_with_meta())
            .await
            .map_err(|_| AppError::Chain("GameJoined log query timed out".into()))?
            .map_err(|e| AppError::Chain(e.to_string()))
    }

    pub async fn fetch_settled(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<(GameSettledFilter, LogMeta)>> {
        let contract = self.reader()?;
        let query = contract
            .game_settled_filter()
            .from_block(from_block)
            .to_block(to_block);
        timeout(deadline(), query.query_with_meta())
            .await
            .map_err(|_| AppError::Chain("GameSettled log query timed out".into()))?
            .map_err(|e| AppError::Chain(e.to_string()))
    }

    /// Reads the optional named opponent from contract storage; the creation
    /// event does not emit it. Zero address means an open game.
    pub async fn get_game_opponent(&self, game_id: &str) -> Result<Option<Address>> {
        let contract = self.reader()?;
        let call = contract.get_game(game_id.to_string());
        let (_creator, opponent, _wager, _status) = timeout(deadline(), call.call())
            .await
            .map_err(|_| AppError::Chain("getGame call timed out".into()))?
            .map_err(|e| AppError::Chain(e.to_string()))?;
        Ok((opponent != Address::zero()).then_some(opponent))
    }

    /// Signs and submits `settleGame(gameId, winner)` with the settler key and
    /// waits for the receipt.
    pub async fn settle_game(&self, game_id: &str, winner: Address) -> Result<TransactionReceipt> {
        let provider = self.client.provider(self.chain_id)?;
        let wallet = self.client.signer(self.chain_id)?;
        let middleware = Arc::new(SignerMiddleware::new((*provider).clone(), wallet));
        let contract = ChessEscrow::new(self.address, middleware);

        let call = contract.settle_game(game_id.to_string(), winner);
        let pending = timeout(deadline(), call.send())
            .await
            .map_err(|_| AppError::Chain("settleGame broadcast timed out".into()))?
            .map_err(|e| AppError::Chain(e.to_string()))?;

        let receipt = timeout(deadline(), pending)
            .await
            .map_err(|_| AppError::Chain("settleGame receipt timed out".into()))?
            .map_err(|e| AppError::Chain(e.to_string()))?
            .ok_or_else(|| AppError::Chain("settleGame transaction dropped".into()))?;
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CHAIN_ID_SEPOLIA;
    use std::collections::HashMap;

    fn client() -> Arc<BlockchainClient> {
        let mut urls = HashMap::new();
        urls.insert(CHAIN_ID_SEPOLIA, "http://localhost:8545".to_string());
        Arc::new(
            BlockchainClient::new(
                urls,
                "test test test test test test test test test test test junk",
            )
            .unwrap(),
        )
    }

    #[test]
    fn escrow_parses_contract_address() {
        let escrow = Escrow::new(
            &format!("0x{}", "ab".repeat(20)),
            CHAIN_ID_SEPOLIA,
            client(),
        )
        .unwrap();
        assert_eq!(escrow.chain_id(), CHAIN_ID_SEPOLIA);
        assert_eq!(escrow.address(), Address::from([0xab; 20]));
    }

    #[test]
    fn escrow_rejects_malformed_address() {
        assert!(Escrow::new("0x123", CHAIN_ID_SEPOLIA, client()).is_err());
    }

    #[test]
    fn game_id_hash_matches_keccak_vector() {
        assert_eq!(
            hex::encode(game_id_hash("")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(game_id_hash("g1"), game_id_hash("g1"));
        assert_ne!(game_id_hash("g1"), game_id_hash("g2"));
    }
}
