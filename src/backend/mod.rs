//! Contract of the authoritative chess backend.
//!
//! The backend owns move legality and board representation. The coordinator
//! only ever talks to it through [`ChessBackend`], which keeps the actor
//! testable against an in-memory stub.

pub mod client;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use client::HttpBackendClient;

/// A game freshly created by the backend for a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedGame {
    #[serde(rename = "gameId")]
    pub session_id: String,
    #[serde(rename = "fen")]
    pub board_state: String,
    pub legal_moves: Vec<String>,
}

/// Position returned after a move or a state query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BoardUpdate {
    #[serde(rename = "fen")]
    pub board_state: String,
    pub legal_moves: Vec<String>,
    /// Optional hint sent alongside an empty move list ("checkmate", "stalemate").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_status: Option<String>,
}

impl BoardUpdate {
    pub fn is_final(&self) -> bool {
        self.legal_moves.is_empty()
    }

    pub fn is_drawn(&self) -> bool {
        self.game_status
            .as_deref()
            .map(|status| {
                let status = status.to_lowercase();
                status.contains("stalemate") || status.contains("draw")
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrawResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_state: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend responded with {status}: {message}")]
    Status { status: u16, message: String },

    #[error("backend does not implement this operation: {0}")]
    Unimplemented(String),
}

impl BackendError {
    /// Classify a non-success response.
    pub fn from_response(status: u16, body: String) -> Self {
        if status == 501 || mentions_unimplemented(&body) {
            BackendError::Unimplemented(body)
        } else {
            BackendError::Status {
                status,
                message: body,
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Http(err) => !err.is_decode() && !err.is_builder(),
            BackendError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            BackendError::Unimplemented(_) => false,
        }
    }
}

pub(crate) fn mentions_unimplemented(text: &str) -> bool {
    text.to_lowercase().contains("not implemented")
}

/// Calls the coordinator needs from the authoritative backend.
///
/// Futures are `'static` so the actor can own them while it keeps handling
/// other sessions.
pub trait ChessBackend: Send + Sync {
    fn create_game(&self, room_code: &str) -> BoxFuture<'static, Result<CreatedGame, BackendError>>;

    fn game_state(&self, session_id: &str) -> BoxFuture<'static, Result<BoardUpdate, BackendError>>;

    /// An empty `legal_moves` in the result means the game is over.
    fn make_move(
        &self,
        session_id: &str,
        chess_move: &str,
    ) -> BoxFuture<'static, Result<BoardUpdate, BackendError>>;

    fn offer_draw(&self, session_id: &str) -> BoxFuture<'static, Result<DrawResponse, BackendError>>;

    fn accept_draw(&self, session_id: &str) -> BoxFuture<'static, Result<DrawResponse, BackendError>>;

    fn health(&self) -> BoxFuture<'static, Result<HealthStatus, BackendError>>;
}
