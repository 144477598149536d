use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::constants::chain_name;

use super::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub rpc: BTreeMap<String, bool>,
    pub poller: PollerHealth,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerHealth {
    pub running: bool,
    pub last_processed_block: u64,
}

fn build_health_response(
    rpc: BTreeMap<String, bool>,
    poller_running: bool,
    last_processed_block: u64,
) -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        rpc,
        poller: PollerHealth {
            running: poller_running,
            last_processed_block,
        },
    }
}

/// Liveness plus RPC connectivity and poller status.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let rpc = state
        .chain
        .validate_connectivity()
        .await
        .into_iter()
        .map(|(chain_id, ok)| (format!("{} ({chain_id})", chain_name(chain_id)), ok))
        .collect();

    Json(build_health_response(
        rpc,
        state.poller.running(),
        state.poller.last_processed_block(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_reports_components() {
        let mut rpc = BTreeMap::new();
        rpc.insert("sepolia (11155111)".to_string(), true);
        let response = build_health_response(rpc, true, 42);
        assert_eq!(response.status, "ok");
        assert!(response.poller.running);
        assert_eq!(response.poller.last_processed_block, 42);
        assert_eq!(response.rpc.get("sepolia (11155111)"), Some(&true));
    }
}
