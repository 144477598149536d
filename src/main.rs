use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gambit_backend::api::{self, AppState};
use gambit_backend::auth::AuthGate;
use gambit_backend::chain::{BlockchainClient, Escrow};
use gambit_backend::config::Config;
use gambit_backend::constants::{chain_name, API_VERSION};
use gambit_backend::lobby::Lobby;
use gambit_backend::poller::{EventPoller, PollerStatus};
use gambit_backend::settler::Settler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gambit_backend=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting Gambit Backend Server");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("API Version: {}", API_VERSION);

    let chain = Arc::new(BlockchainClient::new(
        config.rpc_urls.clone(),
        &config.mnemonic,
    )?);
    tracing::info!("Settler address: {:?}", chain.settler_address());

    let escrow = Escrow::new(
        &config.escrow_contract_address,
        config.escrow_chain_id,
        chain.clone(),
    )
    .map_err(|e| anyhow::anyhow!("escrow binding failed: {e}"))?;
    tracing::info!(
        "Escrow contract: {} on {}",
        config.escrow_contract_address,
        chain_name(config.escrow_chain_id)
    );

    let auth = AuthGate::new(&config)?;
    let lobby = Arc::new(Lobby::new());
    let settlements = Settler::spawn(escrow.clone(), lobby.clone());
    let poller_status = Arc::new(PollerStatus::default());

    let state = AppState {
        config: config.clone(),
        lobby: lobby.clone(),
        auth,
        chain: chain.clone(),
        poller: poller_status.clone(),
        settlements,
    };

    let app = build_router(state);

    for (chain_id, ok) in chain.validate_connectivity().await {
        if ok {
            tracing::info!("RPC connectivity ok: {} ({})", chain_name(chain_id), chain_id);
        } else {
            tracing::warn!(
                "RPC connectivity failed: {} ({})",
                chain_name(chain_id),
                chain_id
            );
        }
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let poller = EventPoller::new(
        lobby,
        escrow,
        poller_status,
        shutdown_rx,
        config.escrow_deploy_block,
    );
    let poller_handle = tokio::spawn(poller.run());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // In-flight settlement tasks run to completion on the runtime; only the
    // poller is waited for here.
    let _ = poller_handle.await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

fn build_router(state: AppState) -> Router {
    let cors = cors_from_config(&state.config);

    Router::new()
        .route("/health", get(api::health::health_check))
        .route("/api/games", get(api::games::list_games))
        .route("/api/games/open", get(api::games::open_games))
        .route("/api/games/active", get(api::games::active_games))
        .route("/api/games/invitations", get(api::games::invitations))
        .route("/api/games/settled", get(api::games::settled_games))
        .route("/api/games/stats", get(api::games::stats))
        .route("/api/games/{id}", get(api::games::get_game))
        .route("/api/games/{id}/chess", get(api::chess::get_chess_state))
        .route(
            "/api/games/{id}/chess/valid-moves/{row}/{col}",
            get(api::chess::valid_moves),
        )
        .route("/api/games/{id}/chess/move", post(api::chess::make_move))
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
