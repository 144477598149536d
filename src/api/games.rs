//! Read-side game queries.

use axum::extract::{Path, Query, State};
use axum::Json;
use ethers::types::Address;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{parse_address, ApiResponse, Game, GameLifecycle, GameStats};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub state: Option<String>,
    pub owner: Option<String>,
    pub opponent: Option<String>,
}

pub async fn list_games(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Game>>>> {
    let lifecycle = query.state.as_deref().map(parse_lifecycle).transpose()?;
    let owner = parse_optional_address(query.owner.as_deref())?;
    let opponent = parse_optional_address(query.opponent.as_deref())?;
    let games = state.lobby.list_filtered(lifecycle, owner, opponent).await;
    Ok(Json(ApiResponse::success(games)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenQuery {
    pub exclude_user: Option<String>,
}

pub async fn open_games(
    State(state): State<AppState>,
    Query(query): Query<OpenQuery>,
) -> Result<Json<ApiResponse<Vec<Game>>>> {
    let exclude = parse_optional_address(query.exclude_user.as_deref())?;
    Ok(Json(ApiResponse::success(
        state.lobby.list_open(exclude).await,
    )))
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user: Option<String>,
}

pub async fn active_games(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ApiResponse<Vec<Game>>>> {
    let user = required_address(query.user.as_deref(), "user")?;
    Ok(Json(ApiResponse::success(
        state.lobby.list_active(user).await,
    )))
}

pub async fn invitations(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ApiResponse<Vec<Game>>>> {
    let user = required_address(query.user.as_deref(), "user")?;
    Ok(Json(ApiResponse::success(
        state.lobby.list_invitations(user).await,
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettledQuery {
    pub user_address: Option<String>,
}

pub async fn settled_games(
    State(state): State<AppState>,
    Query(query): Query<SettledQuery>,
) -> Result<Json<ApiResponse<Vec<Game>>>> {
    let user = required_address(query.user_address.as_deref(), "userAddress")?;
    Ok(Json(ApiResponse::success(
        state.lobby.list_settled(user).await,
    )))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<ApiResponse<GameStats>>> {
    Ok(Json(ApiResponse::success(state.lobby.stats().await)))
}

pub async fn get_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Game>>> {
    let game = state
        .lobby
        .get_game(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("game {id}")))?;
    Ok(Json(ApiResponse::success(game)))
}

fn parse_lifecycle(raw: &str) -> Result<GameLifecycle> {
    match raw.to_ascii_uppercase().as_str() {
        "CREATED" => Ok(GameLifecycle::Created),
        "WAITING" => Ok(GameLifecycle::Waiting),
        "STARTED" => Ok(GameLifecycle::Started),
        "SETTLED" => Ok(GameLifecycle::Settled),
        other => Err(AppError::Validation(format!("unknown game state: {other}"))),
    }
}

fn parse_optional_address(raw: Option<&str>) -> Result<Option<Address>> {
    raw.map(parse_address).transpose()
}

fn required_address(raw: Option<&str>, name: &str) -> Result<Address> {
    let raw = raw.ok_or_else(|| {
        AppError::Validation(format!("{name} query parameter is required"))
    })?;
    parse_address(raw)
}
