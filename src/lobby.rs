//! In-memory game store and lifecycle state machine.
//!
//! The lobby exclusively owns every [`Game`] record; callers receive clones.
//! All access is serialized behind one lobby-wide lock which is never held
//! across an RPC call. Settlement is handed back to the caller as a job.

use std::collections::HashMap;

use chrono::Utc;
use ethers::types::{Address, U256};
use tokio::sync::RwLock;

use crate::chess::{self, ChessStatus, Move, PieceKind, Square};
use crate::error::{AppError, Result};
use crate::models::{EscrowInfo, Game, GameLifecycle, GameStats, NetworkType};

/// Fact observed from a `GameCreated` log, enriched with the contract-read
/// opponent (the event itself does not carry it).
#[derive(Debug, Clone)]
pub struct CreationEvent {
    pub game_id: String,
    pub creator: Address,
    pub opponent: Option<Address>,
    pub wager: U256,
    pub chain_id: u64,
    pub contract_address: String,
    pub tx_hash: String,
    pub block_number: u64,
}

#[derive(Debug, Clone)]
pub struct JoinEvent {
    pub game_id: String,
    pub joiner: Address,
    pub wager: U256,
}

/// Hand-off to the settler after a checkmate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementJob {
    pub game_id: String,
    pub winner: Address,
    pub chain_id: u64,
}

#[derive(Debug, Clone)]
pub struct MoveApplied {
    pub mv: Move,
    pub game: Game,
    pub settlement: Option<SettlementJob>,
}

#[derive(Default)]
pub struct Lobby {
    games: RwLock<HashMap<String, Game>>,
}

impl Lobby {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insert from a `GameCreated` event. Re-delivery is a no-op.
    pub async fn upsert_from_creation(&self, evt: CreationEvent) {
        let mut games = self.games.write().await;
        if games.contains_key(&evt.game_id) {
            return;
        }
        tracing::info!(
            game_id = %evt.game_id,
            creator = ?evt.creator,
            open = evt.opponent.is_none(),
            "materializing game from chain"
        );
        games.insert(
            evt.game_id.clone(),
            Game {
                id: evt.game_id,
                owner: evt.creator,
                opponent: evt.opponent,
                wager: evt.wager,
                network_type: NetworkType::Evm,
                chain_id: Some(evt.chain_id),
                state: GameLifecycle::Waiting,
                created_at: Utc::now(),
                started_at: None,
                settled_at: None,
                chess: None,
                winner: None,
                escrow: Some(EscrowInfo {
                    contract_address: evt.contract_address,
                    creation_tx_hash: evt.tx_hash,
                    creation_block: evt.block_number,
                    settlement_tx_hash: None,
                }),
            },
        );
    }

    /// Starts a game when its `GameJoined` event is observed. A second
    /// application (re-delivered event) leaves the record unchanged.
    pub async fn apply_join(&self, evt: JoinEvent) {
        let mut games = self.games.write().await;
        let Some(game) = games.get_mut(&evt.game_id) else {
            tracing::warn!(game_id = %evt.game_id, "join event for unknown game");
            return;
        };
        if !matches!(
            game.state,
            GameLifecycle::Created | GameLifecycle::Waiting
        ) {
            return;
        }
        game.opponent = Some(evt.joiner);
        game.state = GameLifecycle::Started;
        game.started_at = Some(Utc::now());
        game.chess = Some(chess::initial_position());
        tracing::info!(game_id = %evt.game_id, joiner = ?evt.joiner, "game started");
    }

    pub async fn get_game(&self, id: &str) -> Option<Game> {
        self.games.read().await.get(id).cloned()
    }

    pub async fn list_filtered(
        &self,
        state: Option<GameLifecycle>,
        owner: Option<Address>,
        opponent: Option<Address>,
    ) -> Vec<Game> {
        self.collect(|game| {
            state.map_or(true, |s| game.state == s)
                && owner.map_or(true, |a| game.owner == a)
                && opponent.map_or(true, |a| game.opponent == Some(a))
        })
        .await
    }

    pub async fn list_by_owner(&self, addr: Address) -> Vec<Game> {
        self.collect(|game| game.owner == addr).await
    }

    pub async fn list_by_opponent(&self, addr: Address) -> Vec<Game> {
        self.collect(|game| game.opponent == Some(addr)).await
    }

    /// Joinable games: waiting with no named opponent, optionally excluding
    /// games the caller created.
    pub async fn list_open(&self, exclude: Option<Address>) -> Vec<Game> {
        self.collect(|game| {
            game.state == GameLifecycle::Waiting
                && game.opponent.is_none()
                && exclude.map_or(true, |a| game.owner != a)
        })
        .await
    }

    /// Waiting games that name `addr` as the invited opponent.
    pub async fn list_invitations(&self, addr: Address) -> Vec<Game> {
        self.collect(|game| game.state == GameLifecycle::Waiting && game.opponent == Some(addr))
            .await
    }

    pub async fn list_active(&self, addr: Address) -> Vec<Game> {
        self.collect(|game| game.state == GameLifecycle::Started && game.involves(addr))
            .await
    }

    pub async fn list_settled(&self, addr: Address) -> Vec<Game> {
        self.collect(|game| game.state == GameLifecycle::Settled && game.involves(addr))
            .await
    }

    pub async fn stats(&self) -> GameStats {
        let games = self.games.read().await;
        let mut stats = GameStats::default();
        for game in games.values() {
            match game.state {
                GameLifecycle::Created => stats.created += 1,
                GameLifecycle::Waiting => stats.waiting += 1,
                GameLifecycle::Started => stats.started += 1,
                GameLifecycle::Settled => stats.settled += 1,
            }
            stats.total += 1;
        }
        stats
    }

    /// Legal destinations for `from`, only answered for the participant whose
    /// turn it is.
    pub async fn valid_moves(&self, id: &str, from: Square, caller: Address) -> Result<Vec<Square>> {
        let games = self.games.read().await;
        let game = games
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("game {id}")))?;
        let chess = Self::authorize_move(game, caller)?;
        Ok(chess::valid_moves(chess, from))
    }

    /// Applies one move for `caller`. On checkmate the game settles with a
    /// winner and the returned job must be forwarded to the settler; on
    /// stalemate it settles with neither.
    pub async fn make_move(
        &self,
        id: &str,
        from: Square,
        to: Square,
        promotion: Option<PieceKind>,
        caller: Address,
    ) -> Result<MoveApplied> {
        let mut games = self.games.write().await;
        let game = games
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("game {id}")))?;
        let chess = Self::authorize_move(game, caller)?;

        let outcome = chess::make_move(chess, from, to, promotion)
            .map_err(|e| AppError::IllegalMove(e.to_string()))?;

        let status = outcome.state.game_status;
        let winner = outcome.state.winner;

        // Resolve the settlement target before touching the record so an
        // inconsistent game can never be left half-updated.
        let mut settlement = None;
        if status == ChessStatus::Checkmate {
            let color = winner
                .ok_or_else(|| AppError::Internal("checkmate without a winner".into()))?;
            let winner_addr = game
                .winner_address(color)
                .ok_or_else(|| AppError::Internal("settled game missing opponent".into()))?;
            let chain_id = game
                .chain_id
                .ok_or_else(|| AppError::Internal("EVM game missing chain id".into()))?;
            settlement = Some(SettlementJob {
                game_id: game.id.clone(),
                winner: winner_addr,
                chain_id,
            });
        }

        game.chess = Some(outcome.state);
        if status.is_terminal() {
            game.state = GameLifecycle::Settled;
            game.settled_at = Some(Utc::now());
            game.winner = winner.filter(|_| status == ChessStatus::Checkmate);
        }

        Ok(MoveApplied {
            mv: outcome.mv,
            game: game.clone(),
            settlement,
        })
    }

    /// Records the settlement transaction hash once the settler confirms it.
    pub async fn record_settlement_tx(&self, id: &str, tx_hash: String) {
        let mut games = self.games.write().await;
        if let Some(escrow) = games.get_mut(id).and_then(|game| game.escrow.as_mut()) {
            escrow.settlement_tx_hash = Some(tx_hash);
        }
    }

    /// Reconciles a `GameSettled` event observed on chain, matched by the
    /// event's keccak id hash. Settles games this process never adjudicated
    /// (backfill after a restart, or settlement submitted by another
    /// instance) and fills in a missing settlement hash; it never overwrites
    /// our own confirmed submission.
    pub async fn apply_settlement_event(
        &self,
        game_id_hash: [u8; 32],
        winner: Address,
        tx_hash: String,
    ) {
        let mut games = self.games.write().await;
        let Some(game) = games
            .values_mut()
            .find(|game| crate::chain::escrow::game_id_hash(&game.id) == game_id_hash)
        else {
            tracing::debug!("GameSettled event for a game this server never saw");
            return;
        };
        if game.state != GameLifecycle::Settled {
            tracing::info!(game_id = %game.id, winner = ?winner, "settlement observed for an unadjudicated game");
            game.state = GameLifecycle::Settled;
            game.settled_at = Some(Utc::now());
            game.winner = game.participant_color(winner);
        }
        if let Some(escrow) = game.escrow.as_mut() {
            if escrow.settlement_tx_hash.is_none() {
                escrow.settlement_tx_hash = Some(tx_hash);
            }
        }
    }

    fn authorize_move(game: &Game, caller: Address) -> Result<&chess::ChessState> {
        if game.state != GameLifecycle::Started {
            return Err(AppError::IllegalState(format!(
                "game is {}, not STARTED",
                game.state.as_str()
            )));
        }
        let chess = game
            .chess
            .as_ref()
            .ok_or_else(|| AppError::Internal("started game missing chess state".into()))?;
        let color = game
            .participant_color(caller)
            .ok_or(AppError::NotParticipant)?;
        if color != chess.current_player {
            return Err(AppError::NotYourTurn);
        }
        Ok(chess)
    }

    async fn collect<F: Fn(&Game) -> bool>(&self, keep: F) -> Vec<Game> {
        let games = self.games.read().await;
        let mut out: Vec<Game> = games.values().filter(|g| keep(g)).cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        out
    }
}
