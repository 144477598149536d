pub mod chess;
pub mod games;
pub mod health;

use std::sync::Arc;

use axum::http::HeaderMap;
use tokio::sync::mpsc;

use crate::auth::{bearer_token, AuthGate, AuthedPlayer};
use crate::chain::BlockchainClient;
use crate::config::Config;
use crate::error::Result;
use crate::lobby::{Lobby, SettlementJob};
use crate::poller::PollerStatus;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub lobby: Arc<Lobby>,
    pub auth: AuthGate,
    pub chain: Arc<BlockchainClient>,
    pub poller: Arc<PollerStatus>,
    pub settlements: mpsc::UnboundedSender<SettlementJob>,
}

/// Resolves the authenticated caller for protected endpoints.
pub async fn require_player(headers: &HeaderMap, state: &AppState) -> Result<AuthedPlayer> {
    let token = bearer_token(headers)?;
    state.auth.verify(token).await
}
