use serde::{Deserialize, Serialize};

/// A connected client waiting in a lobby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub connection_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LobbyStatus {
    Waiting,
    InGame,
}

/// Pre-game room. Players are kept in join order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lobby {
    pub room_code: String,
    pub players: Vec<Player>,
    pub status: LobbyStatus,
}

impl Lobby {
    pub const CAPACITY: usize = 2;

    pub fn is_full(&self) -> bool {
        self.players.len() >= Self::CAPACITY
    }

    pub fn has_connection(&self, connection_id: &str) -> bool {
        self.players.iter().any(|p| p.connection_id == connection_id)
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.players
            .iter()
            .any(|p| p.display_name.to_lowercase() == name.to_lowercase())
    }

    pub fn connection_ids(&self) -> impl Iterator<Item = &str> {
        self.players.iter().map(|p| p.connection_id.as_str())
    }
}
