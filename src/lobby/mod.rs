//! Pre-game matchmaking: rooms that two clients meet in before a game exists.

pub mod registry;

pub use registry::{Departure, RoomRegistry};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("You are already in a lobby ({0}). Cannot create another.")]
    AlreadyInRoom(String),

    #[error("Room {0} not found")]
    RoomNotFound(String),

    #[error("The name \"{0}\" is already taken in this lobby.")]
    NameTaken(String),

    #[error("Room {0} is full")]
    RoomFull(String),
}
