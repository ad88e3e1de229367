use serde::{Deserialize, Serialize};

use crate::error::CoordinatorError;

/// One of the two fixed seats of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opponent(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameStatus {
    Playing,
    WhiteWon,
    BlackWon,
    Draw,
    Timeout,
}

impl GameStatus {
    pub fn won_by(color: Color) -> GameStatus {
        match color {
            Color::White => GameStatus::WhiteWon,
            Color::Black => GameStatus::BlackWon,
        }
    }

    /// Transition table: only `playing` has outgoing edges, every terminal state is absorbing.
    pub fn can_transition_to(self, next: GameStatus) -> bool {
        matches!(
            (self, next),
            (
                GameStatus::Playing,
                GameStatus::WhiteWon | GameStatus::BlackWon | GameStatus::Draw | GameStatus::Timeout
            )
        )
    }
}

/// A player's seat inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub name: String,
    pub connection_id: Option<String>,
    pub has_move: bool,
    pub time_remaining_seconds: u32,
}

impl Seat {
    pub fn new(name: String, has_move: bool, time_remaining_seconds: u32) -> Self {
        Self {
            name,
            connection_id: None,
            has_move,
            time_remaining_seconds,
        }
    }

    pub fn is_bound_to(&self, connection_id: &str) -> bool {
        self.connection_id.as_deref() == Some(connection_id)
    }
}

/// Game session as seen by clients; board and moves belong to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    pub session_id: String,
    pub room_code: String,
    pub white: Seat,
    pub black: Seat,
    pub board_state: String,
    pub legal_moves: Vec<String>,
    pub draw_offer_from: Option<Color>,
    pub status: GameStatus,
}

impl GameSession {
    pub fn seat(&self, color: Color) -> &Seat {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    pub fn seat_mut(&mut self, color: Color) -> &mut Seat {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    pub fn color_of(&self, connection_id: &str) -> Option<Color> {
        if self.white.is_bound_to(connection_id) {
            Some(Color::White)
        } else if self.black.is_bound_to(connection_id) {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn color_to_move(&self) -> Color {
        if self.white.has_move {
            Color::White
        } else {
            Color::Black
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status == GameStatus::Playing
    }

    /// Move to a terminal status. Any pending draw offer is dropped.
    pub fn transition(&mut self, next: GameStatus) -> Result<(), CoordinatorError> {
        if !self.status.can_transition_to(next) {
            return Err(CoordinatorError::ProtocolState(format!(
                "Cannot move game {} from {:?} to {:?}",
                self.room_code, self.status, next
            )));
        }
        self.status = next;
        self.draw_offer_from = None;
        Ok(())
    }

    pub fn connection_ids(&self) -> impl Iterator<Item = &str> {
        self.white
            .connection_id
            .as_deref()
            .into_iter()
            .chain(self.black.connection_id.as_deref())
    }
}
