use actix::Message;
use log::warn;
use serde::{Deserialize, Serialize};

use super::game_state::{Color, GameSession, GameStatus};
use super::lobby::{Lobby, Player};
use crate::error::CoordinatorError;

const NAME_LENGTH: std::ops::RangeInclusive<usize> = 2..=20;
const ROOM_CODE_LENGTH: usize = 4;

/// Event sent from client to server: `{"event": "...", "data": {...}}`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "lobby:create")]
    LobbyCreate(CreateLobby),
    #[serde(rename = "lobby:join")]
    LobbyJoin(JoinLobby),
    #[serde(rename = "game:join")]
    GameJoin(GameJoin),
    #[serde(rename = "game:move")]
    GameMove(GameMove),
    #[serde(rename = "game:draw:offer")]
    DrawOffer(RoomRef),
    #[serde(rename = "game:draw:accept")]
    DrawAccept(RoomRef),
    #[serde(rename = "game:resign")]
    Resign(RoomRef),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CreateLobby {
    pub name: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinLobby {
    pub room_code: String,
    pub name: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameJoin {
    pub room_code: String,
    pub player_name: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameMove {
    pub room_code: String,
    #[serde(rename = "move")]
    pub chess_move: String,
    pub player_name: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_code: String,
}

/// Which error event a failure belongs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Lobby,
    Game,
}

impl Scope {
    /// Best-effort guess for frames that did not parse.
    pub fn of_raw(text: &str) -> Scope {
        #[derive(Deserialize)]
        struct EventName {
            event: String,
        }
        match serde_json::from_str::<EventName>(text) {
            Ok(name) if name.event.starts_with("lobby:") => Scope::Lobby,
            Ok(_) => Scope::Game,
            Err(_) => Scope::Lobby,
        }
    }

    pub fn error(self, message: impl Into<String>) -> ServerMessage {
        let payload = ErrorPayload {
            message: message.into(),
        };
        match self {
            Scope::Lobby => ServerMessage::LobbyError(payload),
            Scope::Game => ServerMessage::GameError(payload),
        }
    }
}

impl ClientMessage {
    pub fn scope(&self) -> Scope {
        match self {
            ClientMessage::LobbyCreate(_) | ClientMessage::LobbyJoin(_) => Scope::Lobby,
            _ => Scope::Game,
        }
    }

    pub fn validate(&self) -> Result<(), CoordinatorError> {
        match self {
            ClientMessage::LobbyCreate(p) => validate_name("name", &p.name),
            ClientMessage::LobbyJoin(p) => {
                validate_room_code(&p.room_code)?;
                validate_name("name", &p.name)
            }
            ClientMessage::GameJoin(p) => {
                validate_room_code(&p.room_code)?;
                validate_name("playerName", &p.player_name)
            }
            ClientMessage::GameMove(p) => {
                validate_room_code(&p.room_code)?;
                validate_name("playerName", &p.player_name)?;
                if p.chess_move.trim().is_empty() {
                    return Err(CoordinatorError::Validation("move must not be empty".to_string()));
                }
                Ok(())
            }
            ClientMessage::DrawOffer(p) | ClientMessage::DrawAccept(p) | ClientMessage::Resign(p) => {
                validate_room_code(&p.room_code)
            }
        }
    }
}

fn validate_name(field: &str, name: &str) -> Result<(), CoordinatorError> {
    let length = name.trim().chars().count();
    if NAME_LENGTH.contains(&length) {
        Ok(())
    } else {
        Err(CoordinatorError::Validation(format!(
            "{} must be between {} and {} characters",
            field,
            NAME_LENGTH.start(),
            NAME_LENGTH.end()
        )))
    }
}

fn validate_room_code(code: &str) -> Result<(), CoordinatorError> {
    let well_formed = code.len() == ROOM_CODE_LENGTH
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if well_formed {
        Ok(())
    } else {
        Err(CoordinatorError::Validation(
            "roomCode must be 4 uppercase letters or digits".to_string(),
        ))
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPayload {
    pub room_code: String,
    pub players: Vec<Player>,
    pub message: String,
}

impl LobbyPayload {
    pub fn new(lobby: &Lobby, message: impl Into<String>) -> Self {
        Self {
            room_code: lobby.room_code.clone(),
            players: lobby.players.clone(),
            message: message.into(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Notice {
    pub message: String,
}

impl Notice {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ClockPayload {
    pub white: u32,
    pub black: u32,
}

impl From<&GameSession> for ClockPayload {
    fn from(session: &GameSession) -> Self {
        Self {
            white: session.white.time_remaining_seconds,
            black: session.black.time_remaining_seconds,
        }
    }
}

/// Event sent from server to client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "lobby:created")]
    LobbyCreated(LobbyPayload),
    #[serde(rename = "lobby:update")]
    LobbyUpdate(LobbyPayload),
    #[serde(rename = "lobby:error")]
    LobbyError(ErrorPayload),
    #[serde(rename = "game:start")]
    GameStart(GameSession),
    #[serde(rename = "game:joined")]
    GameJoined { message: String, color: Color },
    #[serde(rename = "game:opponentReady")]
    OpponentReady(Notice),
    #[serde(rename = "game:update")]
    GameUpdate(GameSession),
    #[serde(rename = "game:clock")]
    Clock(ClockPayload),
    #[serde(rename = "game:draw:offered")]
    DrawOffered { from: Color },
    #[serde(rename = "game:result")]
    GameResult { winner: String, loser: String },
    #[serde(rename = "game:finished")]
    GameFinished { message: String, status: GameStatus },
    #[serde(rename = "game:error")]
    GameError(ErrorPayload),
    #[serde(rename = "game:opponentDisconnected")]
    OpponentDisconnected(Notice),
}

impl ServerMessage {
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Error serializing message: {}", e);
                None
            }
        }
    }
}

/// Serialized frame pushed to a socket.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct ChessWebSocketMessage(pub String);

/// Asks a socket to close itself.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct ForceDisconnect {
    pub reason: String,
}
