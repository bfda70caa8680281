//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::agent::UnsupportedProviderError;
use crate::orchestrator::GameError;

/// Errors a route can answer with.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Another run holds the game.
    #[error("A turn is already in progress")]
    Busy,

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Provider(#[from] UnsupportedProviderError),

    #[error("{0}")]
    BadRequest(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Busy => StatusCode::CONFLICT,
            ServerError::Game(_) | ServerError::Provider(_) | ServerError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!("Request rejected ({}): {}", status, self);
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
