//! Chess state reads and authenticated move submission.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::chess::{ChessState, Move, PieceKind, Square};
use crate::error::{AppError, Result};
use crate::models::{ApiResponse, Game};

use super::{require_player, AppState};

pub async fn get_chess_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ChessState>>> {
    let game = state
        .lobby
        .get_game(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("game {id}")))?;
    let chess = game
        .chess
        .ok_or_else(|| AppError::NotFound(format!("game {id} has not started")))?;
    Ok(Json(ApiResponse::success(chess)))
}

pub async fn valid_moves(
    State(state): State<AppState>,
    Path((id, row, col)): Path<(String, usize, usize)>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<Square>>>> {
    let player = require_player(&headers, &state).await?;
    let from = ensure_square(Square::new(row, col))?;
    let moves = state.lobby.valid_moves(&id, from, player.wallet).await?;
    Ok(Json(ApiResponse::success(moves)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub from: Square,
    pub to: Square,
    pub promotion_piece: Option<PieceKind>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResponse {
    pub success: bool,
    #[serde(rename = "move")]
    pub mv: Move,
    pub game_state: Game,
}

pub async fn make_move(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<MoveRequest>,
) -> Result<Json<MoveResponse>> {
    let player = require_player(&headers, &state).await?;
    let from = ensure_square(request.from)?;
    let to = ensure_square(request.to)?;

    let applied = state
        .lobby
        .make_move(&id, from, to, request.promotion_piece, player.wallet)
        .await?;

    // Settlement is fire-and-forget; the move response never waits on it.
    if let Some(job) = applied.settlement {
        if state.settlements.send(job).is_err() {
            tracing::error!(game_id = %id, "settler worker unavailable; settlement not submitted");
        }
    }

    Ok(Json(MoveResponse {
        success: true,
        mv: applied.mv,
        game_state: applied.game,
    }))
}

fn ensure_square(square: Square) -> Result<Square> {
    if square.in_bounds() {
        Ok(square)
    } else {
        Err(AppError::Validation(format!(
            "coordinate out of range: ({}, {})",
            square.row, square.col
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_coordinates_rejected() {
        assert!(ensure_square(Square::new(7, 7)).is_ok());
        assert!(ensure_square(Square::new(8, 0)).is_err());
        assert!(ensure_square(Square::new(0, 9)).is_err());
    }

    #[test]
    fn move_request_parses_wire_shape() {
        let raw = r#"{"from":{"row":6,"col":4},"to":{"row":4,"col":4},"promotionPiece":"knight"}"#;
        let request: MoveRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.from, Square::new(6, 4));
        assert_eq!(request.to, Square::new(4, 4));
        assert_eq!(request.promotion_piece, Some(PieceKind::Knight));

        let raw = r#"{"from":{"row":6,"col":4},"to":{"row":5,"col":4}}"#;
        let request: MoveRequest = serde_json::from_str(raw).unwrap();
        assert!(request.promotion_piece.is_none());
    }
}
