use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Bad request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("You are not a participant of this game")]
    NotParticipant,

    #[error("It is not your turn")]
    NotYourTurn,

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Blockchain RPC error: {0}")]
    Chain(String),

    #[error("Unsupported chain id: {0}")]
    UnsupportedChain(u64),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_)
            | AppError::IllegalState(_)
            | AppError::NotYourTurn
            | AppError::IllegalMove(_) => StatusCode::BAD_REQUEST,
            AppError::NotParticipant => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Chain(_) | AppError::UnsupportedChain(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
