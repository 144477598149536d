use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::chess::{ChessState, Color};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    #[serde(rename = "EVM")]
    Evm,
    /// Reserved; not used by the current escrow deployment.
    #[serde(rename = "SOL")]
    Sol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameLifecycle {
    Created,
    Waiting,
    Started,
    Settled,
}

impl GameLifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Waiting => "WAITING",
            Self::Started => "STARTED",
            Self::Settled => "SETTLED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowInfo {
    pub contract_address: String,
    pub creation_tx_hash: String,
    pub creation_block: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_tx_hash: Option<String>,
}

/// The lobby's authoritative record of one wagered game.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: String,
    pub owner: Address,
    pub opponent: Option<Address>,
    #[serde(with = "wager_string")]
    pub wager: U256,
    pub network_type: NetworkType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    pub state: GameLifecycle,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
    #[serde(rename = "chessState", skip_serializing_if = "Option::is_none")]
    pub chess: Option<ChessState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escrow: Option<EscrowInfo>,
}

impl Game {
    pub fn involves(&self, addr: Address) -> bool {
        self.owner == addr || self.opponent == Some(addr)
    }

    /// Open games wait for any joiner; invitations name one.
    pub fn is_open(&self) -> bool {
        matches!(self.state, GameLifecycle::Created | GameLifecycle::Waiting)
            && self.opponent.is_none()
    }

    /// White is the creator, Black the joiner.
    pub fn participant_color(&self, addr: Address) -> Option<Color> {
        if self.owner == addr {
            Some(Color::White)
        } else if self.opponent == Some(addr) {
            Some(Color::Black)
        } else {
            None
        }
    }

    /// On-chain address the pot should be released to, given the engine winner.
    pub fn winner_address(&self, winner: Color) -> Option<Address> {
        match winner {
            Color::White => Some(self.owner),
            Color::Black => self.opponent,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GameStats {
    pub created: usize,
    pub waiting: usize,
    pub started: usize,
    pub settled: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Wei amounts travel as decimal strings (they may exceed 2^53).
mod wager_string {
    use ethers::types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_dec_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// Strict `0x`-prefixed 20-byte hex address parse, case-insensitive.
pub fn parse_address(raw: &str) -> Result<Address, AppError> {
    let trimmed = raw.trim();
    if !trimmed.starts_with("0x") || trimmed.len() != 42 {
        return Err(AppError::Validation(format!(
            "invalid address: {trimmed}"
        )));
    }
    trimmed
        .parse::<Address>()
        .map_err(|_| AppError::Validation(format!("invalid address: {trimmed}")))
}
