//! Background settlement worker.
//!
//! Checkmate hand-offs arrive on an mpsc channel so the winning move's HTTP
//! response never waits on the chain. Failures are logged and not retried:
//! the contract is the source of truth for funds.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::chain::Escrow;
use crate::lobby::{Lobby, SettlementJob};

pub struct Settler;

impl Settler {
    /// Spawns the worker and returns the job sender handed to move handlers.
    pub fn spawn(escrow: Escrow, lobby: Arc<Lobby>) -> mpsc::UnboundedSender<SettlementJob> {
        let (tx, mut rx) = mpsc::unbounded_channel::<SettlementJob>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if job.chain_id != escrow.chain_id() {
                    tracing::error!(
                        game_id = %job.game_id,
                        chain_id = job.chain_id,
                        escrow_chain = escrow.chain_id(),
                        "settlement requested on unsupported chain"
                    );
                    continue;
                }

                tracing::info!(
                    game_id = %job.game_id,
                    winner = ?job.winner,
                    "submitting settleGame"
                );
                match escrow.settle_game(&job.game_id, job.winner).await {
                    Ok(receipt) => {
                        let tx_hash = format!("{:?}", receipt.transaction_hash);
                        lobby.record_settlement_tx(&job.game_id, tx_hash.clone()).await;
                        tracing::info!(
                            game_id = %job.game_id,
                            tx_hash = %tx_hash,
                            "settlement confirmed"
                        );
                    }
                    Err(e) => {
                        // No automatic retry; the next poll corrects our view
                        // and operators reconcile from these logs.
                        tracing::error!(
                            game_id = %job.game_id,
                            winner = ?job.winner,
                            error = %e,
                            "settlement failed"
                        );
                    }
                }
            }
        });

        tx
    }
}
