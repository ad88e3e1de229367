use crate::backend::BackendError;
use crate::lobby::LobbyError;

/// Everything that can go wrong while handling one client event.
///
/// None of these terminate the connection on their own; the coordinator
/// turns them into a `lobby:error` / `game:error` frame for the requester.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("{0}")]
    Validation(String),

    #[error("{player_name} is not a player in game {room_code}")]
    AccessDenied { room_code: String, player_name: String },

    #[error("Game {0} not found")]
    NotFound(String),

    #[error("Not your turn!")]
    OutOfTurn,

    #[error("{0}")]
    ProtocolState(String),

    #[error("game service unavailable: {0}")]
    BackendUnavailable(BackendError),

    #[error("game service does not support this operation: {0}")]
    BackendUnimplemented(String),

    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<BackendError> for CoordinatorError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unimplemented(message) => CoordinatorError::BackendUnimplemented(message),
            other => CoordinatorError::BackendUnavailable(other),
        }
    }
}

impl CoordinatorError {
    pub fn finished() -> Self {
        CoordinatorError::ProtocolState("This game is already over".to_string())
    }

    pub fn busy() -> Self {
        CoordinatorError::ProtocolState("Another action is already in progress".to_string())
    }

    /// Text sent to the client. Backend and internal details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            CoordinatorError::BackendUnavailable(_) | CoordinatorError::BackendUnimplemented(_) => {
                "Game service is unavailable. Please try again.".to_string()
            }
            CoordinatorError::Internal(_) => "Something went wrong. Please try again.".to_string(),
            CoordinatorError::AccessDenied { .. } => "You are not a player in this game".to_string(),
            other => other.to_string(),
        }
    }
}
