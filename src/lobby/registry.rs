use std::collections::HashMap;

use log::{info, warn};
use rand::Rng;

use super::LobbyError;
use crate::models::{Lobby, LobbyStatus, Player};

const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ROOM_CODE_LEN: usize = 4;

/// Random 4-character room code. Not checked against live codes.
pub fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_CHARSET[rng.gen_range(0..ROOM_CODE_CHARSET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub lobby: Lobby,
    /// Set when the join filled the room: a game must now be created, and
    /// its result is only accepted while this token is still current.
    pub handoff: Option<u64>,
}

/// What a disconnect did to a lobby.
#[derive(Debug, Clone, PartialEq)]
pub enum Departure {
    Deleted(String),
    Updated(Lobby),
}

/// Owns every lobby that has not yet turned into a game.
pub struct RoomRegistry {
    rooms: HashMap<String, Lobby>,
    /// Room code -> token of the handoff currently waiting on the backend.
    handoffs: HashMap<String, u64>,
    next_handoff: u64,
    generate_code: Box<dyn FnMut() -> String>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_code_generator(generate_room_code)
    }

    pub fn with_code_generator(generate_code: impl FnMut() -> String + 'static) -> Self {
        Self {
            rooms: HashMap::new(),
            handoffs: HashMap::new(),
            next_handoff: 0,
            generate_code: Box::new(generate_code),
        }
    }

    #[cfg(test)]
    pub fn get(&self, room_code: &str) -> Option<&Lobby> {
        self.rooms.get(room_code)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn create_room(&mut self, connection_id: &str, name: &str) -> Result<Lobby, LobbyError> {
        if let Some(existing) = self.rooms.values().find(|l| l.has_connection(connection_id)) {
            warn!(
                "Client {} tried to create a room but is already in room {}",
                connection_id, existing.room_code
            );
            return Err(LobbyError::AlreadyInRoom(existing.room_code.clone()));
        }

        let room_code = (self.generate_code)();
        let lobby = Lobby {
            room_code: room_code.clone(),
            players: vec![Player {
                connection_id: connection_id.to_string(),
                display_name: name.to_string(),
            }],
            status: LobbyStatus::Waiting,
        };
        if self.rooms.insert(room_code.clone(), lobby.clone()).is_some() {
            self.handoffs.remove(&room_code);
            warn!("Room code {} collided with a live room; the old room was replaced", room_code);
        }
        info!("Room {} created by {} ({})", room_code, name, connection_id);
        Ok(lobby)
    }

    pub fn join_room(
        &mut self,
        room_code: &str,
        connection_id: &str,
        name: &str,
    ) -> Result<JoinOutcome, LobbyError> {
        let lobby = self
            .rooms
            .get_mut(room_code)
            .ok_or_else(|| LobbyError::RoomNotFound(room_code.to_string()))?;

        if lobby.has_name(name) {
            return Err(LobbyError::NameTaken(name.to_string()));
        }
        if lobby.is_full() {
            return Err(LobbyError::RoomFull(room_code.to_string()));
        }

        lobby.players.push(Player {
            connection_id: connection_id.to_string(),
            display_name: name.to_string(),
        });
        info!("Player {} joined room {}", name, room_code);

        let handoff = if lobby.is_full() {
            lobby.status = LobbyStatus::InGame;
            self.next_handoff += 1;
            self.handoffs.insert(room_code.to_string(), self.next_handoff);
            info!("Room {} is full, handing off to a game (handoff {})", room_code, self.next_handoff);
            Some(self.next_handoff)
        } else {
            None
        };
        Ok(JoinOutcome {
            lobby: lobby.clone(),
            handoff,
        })
    }

    fn is_current_handoff(&self, room_code: &str, handoff: u64) -> bool {
        self.handoffs.get(room_code) == Some(&handoff)
    }

    /// Removes a lobby whose game was created. Returns `None` when `handoff`
    /// is no longer the room's current one (someone left meanwhile).
    pub fn complete_handoff(&mut self, room_code: &str, handoff: u64) -> Option<Lobby> {
        if !self.is_current_handoff(room_code, handoff) {
            return None;
        }
        self.handoffs.remove(room_code);
        let lobby = self.rooms.remove(room_code);
        info!("Lobby {} destroyed after game start", room_code);
        lobby
    }

    /// Backend refused to create the game: keep only the creator and reopen.
    /// Returns the reopened lobby and the players that were dropped, or
    /// `None` when `handoff` is stale.
    pub fn rollback_handoff(&mut self, room_code: &str, handoff: u64) -> Option<(Lobby, Vec<Player>)> {
        if !self.is_current_handoff(room_code, handoff) {
            return None;
        }
        self.handoffs.remove(room_code);
        let lobby = self.rooms.get_mut(room_code)?;
        let dropped = if lobby.players.len() > 1 {
            lobby.players.split_off(1)
        } else {
            Vec::new()
        };
        lobby.status = LobbyStatus::Waiting;
        warn!("Game creation for room {} failed, room reopened", room_code);
        Some((lobby.clone(), dropped))
    }

    pub fn handle_disconnect(&mut self, connection_id: &str) -> Vec<Departure> {
        let mut departures = Vec::new();
        let mut emptied = Vec::new();

        for (room_code, lobby) in self.rooms.iter_mut() {
            let before = lobby.players.len();
            lobby.players.retain(|p| p.connection_id != connection_id);
            if lobby.players.len() == before {
                continue;
            }
            warn!("Player {} leaving room {}", connection_id, room_code);
            if self.handoffs.remove(room_code).is_some() {
                info!("Pending handoff of room {} abandoned", room_code);
            }
            if lobby.players.is_empty() {
                emptied.push(room_code.clone());
            } else {
                lobby.status = LobbyStatus::Waiting;
                departures.push(Departure::Updated(lobby.clone()));
            }
        }

        for room_code in emptied {
            self.rooms.remove(&room_code);
            warn!("Room {} is empty, deleting", room_code);
            departures.push(Departure::Deleted(room_code));
        }
        departures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_codes(codes: &'static [&'static str]) -> RoomRegistry {
        let mut next = codes.iter();
        RoomRegistry::with_code_generator(move || next.next().map(|c| c.to_string()).unwrap_or_default())
    }

    #[test]
    fn generated_codes_are_four_uppercase_alphanumerics() {
        for _ in 0..100 {
            let code = generate_room_code();
            assert_eq!(code.len(), 4);
            assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn create_room_seats_creator_and_waits() {
        let mut rooms = fixed_codes(&["AAAA"]);
        let lobby = rooms.create_room("c1", "Ann").unwrap();
        assert_eq!(lobby.room_code, "AAAA");
        assert_eq!(lobby.players.len(), 1);
        assert_eq!(lobby.status, LobbyStatus::Waiting);
    }

    #[test]
    fn creating_twice_from_same_connection_fails() {
        let mut rooms = fixed_codes(&["AAAA", "BBBB"]);
        rooms.create_room("c1", "Ann").unwrap();
        assert_eq!(
            rooms.create_room("c1", "Ann"),
            Err(LobbyError::AlreadyInRoom("AAAA".into()))
        );
        assert_eq!(rooms.len(), 1);
    }

    #[test]
    fn join_unknown_room_fails() {
        let mut rooms = RoomRegistry::new();
        assert_eq!(
            rooms.join_room("ZZZZ", "c2", "Bob"),
            Err(LobbyError::RoomNotFound("ZZZZ".into()))
        );
    }

    #[test]
    fn names_are_unique_case_insensitively() {
        let mut rooms = fixed_codes(&["AAAA"]);
        rooms.create_room("c1", "Ann").unwrap();
        assert_eq!(
            rooms.join_room("AAAA", "c2", "aNN"),
            Err(LobbyError::NameTaken("aNN".into()))
        );
    }

    #[test]
    fn second_join_fills_room_and_third_is_rejected_without_side_effects() {
        let mut rooms = fixed_codes(&["AAAA"]);
        rooms.create_room("c1", "Ann").unwrap();
        let outcome = rooms.join_room("AAAA", "c2", "Bob").unwrap();
        assert!(outcome.handoff.is_some());
        assert_eq!(outcome.lobby.status, LobbyStatus::InGame);
        let names: Vec<_> = outcome.lobby.players.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(names, ["Ann", "Bob"]);

        let before = rooms.get("AAAA").cloned();
        assert_eq!(
            rooms.join_room("AAAA", "c3", "Cid"),
            Err(LobbyError::RoomFull("AAAA".into()))
        );
        assert_eq!(rooms.get("AAAA").cloned(), before);
    }

    #[test]
    fn completed_handoff_deletes_lobby() {
        let mut rooms = fixed_codes(&["AAAA"]);
        rooms.create_room("c1", "Ann").unwrap();
        let handoff = rooms.join_room("AAAA", "c2", "Bob").unwrap().handoff.unwrap();
        let lobby = rooms.complete_handoff("AAAA", handoff).unwrap();
        assert_eq!(lobby.players.len(), 2);
        assert!(rooms.get("AAAA").is_none());
    }

    #[test]
    fn handoff_is_abandoned_if_a_player_left_meanwhile() {
        let mut rooms = fixed_codes(&["AAAA"]);
        rooms.create_room("c1", "Ann").unwrap();
        let handoff = rooms.join_room("AAAA", "c2", "Bob").unwrap().handoff.unwrap();
        rooms.handle_disconnect("c2");
        assert!(rooms.complete_handoff("AAAA", handoff).is_none());
        assert!(rooms.rollback_handoff("AAAA", handoff).is_none());
        assert_eq!(rooms.get("AAAA").unwrap().status, LobbyStatus::Waiting);
    }

    #[test]
    fn stale_handoff_answers_leave_the_refilled_room_alone() {
        let mut rooms = fixed_codes(&["AAAA"]);
        rooms.create_room("c1", "Ann").unwrap();
        let first = rooms.join_room("AAAA", "c2", "Bob").unwrap().handoff.unwrap();
        rooms.handle_disconnect("c2");
        let second = rooms.join_room("AAAA", "c3", "Cid").unwrap().handoff.unwrap();
        assert_ne!(first, second);

        // the first game's failure must not evict Cid
        assert!(rooms.rollback_handoff("AAAA", first).is_none());
        let lobby = rooms.get("AAAA").unwrap();
        assert_eq!(lobby.status, LobbyStatus::InGame);
        assert_eq!(lobby.players[1].display_name, "Cid");

        // nor may its success start a game for the wrong pair
        assert!(rooms.complete_handoff("AAAA", first).is_none());
        let lobby = rooms.complete_handoff("AAAA", second).unwrap();
        let names: Vec<_> = lobby.players.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(names, ["Ann", "Cid"]);
        assert_eq!(rooms.len(), 0);
    }

    #[test]
    fn rollback_keeps_only_the_creator() {
        let mut rooms = fixed_codes(&["AAAA"]);
        rooms.create_room("c1", "Ann").unwrap();
        let handoff = rooms.join_room("AAAA", "c2", "Bob").unwrap().handoff.unwrap();

        let (lobby, dropped) = rooms.rollback_handoff("AAAA", handoff).unwrap();
        assert_eq!(lobby.status, LobbyStatus::Waiting);
        assert_eq!(lobby.players.len(), 1);
        assert_eq!(lobby.players[0].display_name, "Ann");
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].display_name, "Bob");

        // the room is joinable again
        assert!(rooms.join_room("AAAA", "c3", "Cid").unwrap().handoff.is_some());
        assert!(rooms.complete_handoff("AAAA", handoff).is_none());
    }

    #[test]
    fn disconnect_deletes_empty_lobby() {
        let mut rooms = fixed_codes(&["AAAA"]);
        rooms.create_room("c1", "Ann").unwrap();
        assert_eq!(rooms.handle_disconnect("c1"), vec![Departure::Deleted("AAAA".into())]);
        assert_eq!(rooms.len(), 0);
    }

    #[test]
    fn disconnect_reopens_lobby_with_remaining_player() {
        let mut rooms = fixed_codes(&["AAAA"]);
        rooms.create_room("c1", "Ann").unwrap();
        rooms.join_room("AAAA", "c2", "Bob").unwrap();

        let departures = rooms.handle_disconnect("c1");
        match departures.as_slice() {
            [Departure::Updated(lobby)] => {
                assert_eq!(lobby.status, LobbyStatus::Waiting);
                assert_eq!(lobby.players[0].display_name, "Bob");
            }
            other => panic!("unexpected departures: {other:?}"),
        }
    }

    #[test]
    fn disconnect_of_unknown_connection_is_a_no_op() {
        let mut rooms = fixed_codes(&["AAAA"]);
        rooms.create_room("c1", "Ann").unwrap();
        assert!(rooms.handle_disconnect("nobody").is_empty());
        assert_eq!(rooms.len(), 1);
    }

    #[test]
    fn colliding_code_replaces_the_live_room() {
        // Known risk: codes are not checked against live rooms.
        let mut rooms = fixed_codes(&["AAAA", "AAAA"]);
        rooms.create_room("c1", "Ann").unwrap();
        rooms.create_room("c2", "Bob").unwrap();

        assert_eq!(rooms.len(), 1);
        let lobby = rooms.get("AAAA").unwrap();
        assert_eq!(lobby.players[0].display_name, "Bob");

        // a join meant for Ann's room lands in Bob's
        let outcome = rooms.join_room("AAAA", "c3", "Cid").unwrap();
        assert_eq!(outcome.lobby.players[0].display_name, "Bob");
    }
}
