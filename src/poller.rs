//! Escrow event poller: drives the lobby from on-chain facts.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethers::contract::LogMeta;
use ethers::types::Address;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::chain::escrow::{Escrow, GameCreatedFilter, GameJoinedFilter};
use crate::constants::POLL_INTERVAL_SECS;
use crate::error::Result;
use crate::lobby::{CreationEvent, JoinEvent, Lobby};

/// Shared view of the poller for the health endpoint.
#[derive(Default)]
pub struct PollerStatus {
    running: AtomicBool,
    last_processed_block: AtomicU64,
}

impl PollerStatus {
    pub fn running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn last_processed_block(&self) -> u64 {
        self.last_processed_block.load(Ordering::Relaxed)
    }

    fn set_running(&self, value: bool) {
        self.running.store(value, Ordering::Relaxed);
    }

    fn set_last_block(&self, value: u64) {
        self.last_processed_block.store(value, Ordering::Relaxed);
    }
}

pub struct EventPoller {
    lobby: Arc<Lobby>,
    escrow: Escrow,
    status: Arc<PollerStatus>,
    shutdown: watch::Receiver<bool>,
    /// Replay history from this block on boot instead of starting at the tip.
    backfill_from: Option<u64>,
    last_processed_block: Option<u64>,
}

impl EventPoller {
    pub fn new(
        lobby: Arc<Lobby>,
        escrow: Escrow,
        status: Arc<PollerStatus>,
        shutdown: watch::Receiver<bool>,
        backfill_from: Option<u64>,
    ) -> Self {
        Self {
            lobby,
            escrow,
            status,
            shutdown,
            backfill_from,
            last_processed_block: None,
        }
    }

    /// Tick loop. Ticks never overlap: the next one waits for the current one
    /// to finish, and a failed range is retried on the following tick.
    pub async fn run(mut self) {
        self.status.set_running(true);
        tracing::info!(
            contract = ?self.escrow.address(),
            chain_id = self.escrow.chain_id(),
            "event poller started"
        );

        let mut ticker = interval(Duration::from_secs(POLL_INTERVAL_SECS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "poll tick failed; range will be retried");
                    }
                }
            }
        }

        self.status.set_running(false);
        tracing::info!("event poller stopped");
    }

    async fn tick(&mut self) -> Result<()> {
        let current = self.escrow.current_block().await?;
        let Some(last) = self.last_processed_block else {
            // First successful probe anchors the cursor. With a configured
            // deployment block the next tick replays history from there;
            // otherwise nothing before boot is replayed.
            match self.backfill_from {
                Some(deploy_block) => {
                    let from = deploy_block.saturating_sub(1).min(current);
                    self.last_processed_block = Some(from);
                    tracing::info!(from_block = deploy_block, "backfilling escrow history");
                }
                None => self.advance_to(current),
            }
            return Ok(());
        };
        if current <= last {
            return Ok(());
        }

        let from = last + 1;
        let created = self.escrow.fetch_created(from, current).await?;
        let joined = self.escrow.fetch_joined(from, current).await?;
        if !created.is_empty() || !joined.is_empty() {
            tracing::info!(
                from,
                to = current,
                created = created.len(),
                joined = joined.len(),
                "reconciling escrow events"
            );
        }

        // A creation always precedes its join in block order; apply all
        // creations first so a same-batch join finds its game.
        for (filter, meta) in created {
            let opponent = match self.escrow.get_game_opponent(&filter.game_id).await {
                Ok(opponent) => opponent,
                Err(e) => {
                    tracing::warn!(
                        game_id = %filter.game_id,
                        error = %e,
                        "getGame failed; treating game as open"
                    );
                    None
                }
            };
            self.lobby
                .upsert_from_creation(creation_event(
                    filter,
                    &meta,
                    self.escrow.chain_id(),
                    opponent,
                ))
                .await;
        }
        for (filter, _meta) in joined {
            self.lobby.apply_join(join_event(filter)).await;
        }

        // Settlements last: they only annotate games that already exist.
        let settled = self.escrow.fetch_settled(from, current).await?;
        for (filter, meta) in settled {
            self.lobby
                .apply_settlement_event(
                    filter.game_id_hash,
                    filter.winner,
                    format!("{:?}", meta.transaction_hash),
                )
                .await;
        }

        self.advance_to(current);
        Ok(())
    }

    fn advance_to(&mut self, block: u64) {
        self.last_processed_block = Some(block);
        self.status.set_last_block(block);
    }
}

pub fn creation_event(
    filter: GameCreatedFilter,
    meta: &LogMeta,
    chain_id: u64,
    opponent: Option<Address>,
) -> CreationEvent {
    CreationEvent {
        game_id: filter.game_id,
        creator: filter.creator,
        opponent,
        wager: filter.wager_amount,
        chain_id,
        contract_address: format!("{:?}", meta.address),
        tx_hash: format!("{:?}", meta.transaction_hash),
        block_number: meta.block_number.as_u64(),
    }
}

pub fn join_event(filter: GameJoinedFilter) -> JoinEvent {
    JoinEvent {
        game_id: filter.game_id,
        joiner: filter.joiner,
        wager: filter.wager_amount,
    }
}
