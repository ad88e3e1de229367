use std::collections::HashMap;

use actix::SpawnHandle;
use log::{info, warn};
use rand::Rng;

use super::clock::ClockCanceller;
use crate::error::CoordinatorError;
use crate::models::{Color, GameSession, GameStatus, Seat};

/// Everything needed to open a session after the backend created the game.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub room_code: String,
    pub session_id: String,
    pub player1_name: String,
    pub player2_name: String,
    pub board_state: String,
    pub legal_moves: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResignOutcome {
    pub session: GameSession,
    pub winner_name: String,
    pub loser_name: String,
}

pub enum TickOutcome {
    /// The tick does not belong to the session's current clock.
    Stale,
    Running(GameSession),
    Expired { color: Color, session: GameSession },
}

#[derive(Debug, Clone, Copy)]
struct ClockHandle {
    handle: SpawnHandle,
    generation: u64,
}

struct SessionEntry {
    session: GameSession,
    clock: Option<ClockHandle>,
    /// A backend call for this session is in flight.
    busy: bool,
}

/// Owns all live game sessions plus the connection and room-code indexes.
///
/// Lookups accept either the backend session id or the room code. The room
/// code index is an alias layer: it can be rebound to a newer session and it
/// is left behind when a session ends.
pub struct SessionRegistry {
    games: HashMap<String, SessionEntry>,
    connections: HashMap<String, String>,
    room_codes: HashMap<String, String>,
    clock_seconds: u32,
    next_generation: u64,
}

impl SessionRegistry {
    pub fn new(clock_seconds: u32) -> Self {
        Self {
            games: HashMap::new(),
            connections: HashMap::new(),
            room_codes: HashMap::new(),
            clock_seconds,
            next_generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    fn resolve(&self, key: &str) -> Option<String> {
        if self.games.contains_key(key) {
            return Some(key.to_string());
        }
        self.room_codes
            .get(key)
            .filter(|id| self.games.contains_key(id.as_str()))
            .cloned()
    }

    fn entry_mut(&mut self, key: &str) -> Option<&mut SessionEntry> {
        let id = self.resolve(key)?;
        self.games.get_mut(&id)
    }

    pub fn get(&self, key: &str) -> Option<&GameSession> {
        let id = self.resolve(key)?;
        self.games.get(&id).map(|entry| &entry.session)
    }

    pub fn session_id_for(&self, connection_id: &str) -> Option<&str> {
        self.connections.get(connection_id).map(String::as_str)
    }

    /// Open a session with a fair coin flip for colors.
    pub fn create_session(&mut self, new: NewSession) -> GameSession {
        let swap = rand::thread_rng().gen_bool(0.5);
        self.insert_session(new, swap)
    }

    pub(crate) fn insert_session(&mut self, new: NewSession, swap: bool) -> GameSession {
        let (white, black) = if swap {
            (new.player2_name, new.player1_name)
        } else {
            (new.player1_name, new.player2_name)
        };
        let session = GameSession {
            session_id: new.session_id.clone(),
            room_code: new.room_code.clone(),
            white: Seat::new(white, true, self.clock_seconds),
            black: Seat::new(black, false, self.clock_seconds),
            board_state: new.board_state,
            legal_moves: new.legal_moves,
            draw_offer_from: None,
            status: GameStatus::Playing,
        };

        if let Some(previous) = self.room_codes.insert(new.room_code.clone(), new.session_id.clone()) {
            if previous != new.session_id {
                warn!(
                    "Room code {} rebound from session {} to {}",
                    new.room_code, previous, new.session_id
                );
            }
        }
        self.games.insert(
            new.session_id.clone(),
            SessionEntry {
                session: session.clone(),
                clock: None,
                busy: false,
            },
        );
        info!(
            "Session {} for room {} created: {} (white) vs {} (black)",
            session.session_id, session.room_code, session.white.name, session.black.name
        );
        session
    }

    /// Bind a socket to the seat whose name matches exactly.
    /// Seat `connection_id` under `player_name`. A socket holds at most one
    /// seat: any seat it held before, in this or another session, is released.
    pub fn register_connection(&mut self, key: &str, player_name: &str, connection_id: &str) -> Option<Color> {
        let id = self.resolve(key)?;
        let session = &self.games.get(&id)?.session;
        let color = if session.white.name == player_name {
            Color::White
        } else if session.black.name == player_name {
            Color::Black
        } else {
            return None;
        };

        if let Some(previous_id) = self.connections.get(connection_id).cloned() {
            self.release_seats(&previous_id, connection_id);
        }
        let entry = self.games.get_mut(&id)?;
        let seat = entry.session.seat_mut(color);
        if let Some(previous) = seat.connection_id.replace(connection_id.to_string()) {
            if previous != connection_id {
                self.connections.remove(&previous);
            }
        }
        self.connections.insert(connection_id.to_string(), id.clone());
        info!("Connection {} bound to {:?} in session {}", connection_id, color, id);
        Some(color)
    }

    pub fn is_players_turn(&self, key: &str, connection_id: &str) -> bool {
        match self.get(key) {
            Some(session) if session.is_playing() => session
                .color_of(connection_id)
                .map(|color| session.seat(color).has_move)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Store the backend's new position and hand the move to the other side.
    ///
    /// The caller must have stopped the clock first.
    pub fn apply_move_result(
        &mut self,
        key: &str,
        board_state: String,
        legal_moves: Vec<String>,
    ) -> Result<GameSession, CoordinatorError> {
        let entry = self
            .entry_mut(key)
            .ok_or_else(|| CoordinatorError::NotFound(key.to_string()))?;
        if !entry.session.is_playing() {
            return Err(CoordinatorError::finished());
        }
        if entry.clock.is_some() {
            return Err(CoordinatorError::Internal(format!(
                "clock of session {} still running while applying a move",
                entry.session.session_id
            )));
        }

        let session = &mut entry.session;
        session.board_state = board_state;
        session.legal_moves = legal_moves;
        session.white.has_move = !session.white.has_move;
        session.black.has_move = !session.black.has_move;
        session.draw_offer_from = None;
        Ok(session.clone())
    }

    pub fn offer_draw(&mut self, key: &str, connection_id: &str) -> Option<GameSession> {
        let entry = self.entry_mut(key)?;
        if !entry.session.is_playing() {
            return None;
        }
        let color = entry.session.color_of(connection_id)?;
        entry.session.draw_offer_from = Some(color);
        info!("{:?} offered a draw in session {}", color, entry.session.session_id);
        Some(entry.session.clone())
    }

    /// True when the connection may accept the draw currently on the table.
    pub fn can_accept_draw(&self, key: &str, connection_id: &str) -> bool {
        match self.get(key) {
            Some(session) if session.is_playing() => match session.color_of(connection_id) {
                Some(color) => session.draw_offer_from == Some(color.opponent()),
                None => false,
            },
            _ => false,
        }
    }

    pub fn accept_draw(
        &mut self,
        key: &str,
        connection_id: &str,
        clocks: &mut impl ClockCanceller,
    ) -> Option<GameSession> {
        if !self.can_accept_draw(key, connection_id) {
            return None;
        }
        self.stop_clock(key, clocks);
        let entry = self.entry_mut(key)?;
        entry.session.transition(GameStatus::Draw).ok()?;
        info!("Draw agreed in session {}", entry.session.session_id);
        Some(entry.session.clone())
    }

    pub fn resign(
        &mut self,
        key: &str,
        connection_id: &str,
        clocks: &mut impl ClockCanceller,
    ) -> Option<ResignOutcome> {
        let session = self.get(key)?;
        if !session.is_playing() {
            return None;
        }
        let color = session.color_of(connection_id)?;

        self.stop_clock(key, clocks);
        let entry = self.entry_mut(key)?;
        entry.session.transition(GameStatus::won_by(color.opponent())).ok()?;
        let session = entry.session.clone();
        info!("{:?} resigned in session {}", color, session.session_id);
        Some(ResignOutcome {
            winner_name: session.seat(color.opponent()).name.clone(),
            loser_name: session.seat(color).name.clone(),
            session,
        })
    }

    /// Terminal transition decided elsewhere (mate or stalemate reported by the backend).
    pub fn conclude(
        &mut self,
        key: &str,
        status: GameStatus,
        clocks: &mut impl ClockCanceller,
    ) -> Result<GameSession, CoordinatorError> {
        self.stop_clock(key, clocks);
        let entry = self
            .entry_mut(key)
            .ok_or_else(|| CoordinatorError::NotFound(key.to_string()))?;
        entry.session.transition(status)?;
        Ok(entry.session.clone())
    }

    /// Mark the session as waiting on the backend. Fails if it already is.
    pub fn begin_action(&mut self, key: &str) -> Result<(), CoordinatorError> {
        let entry = self
            .entry_mut(key)
            .ok_or_else(|| CoordinatorError::NotFound(key.to_string()))?;
        if entry.busy {
            return Err(CoordinatorError::busy());
        }
        entry.busy = true;
        Ok(())
    }

    pub fn end_action(&mut self, key: &str) {
        if let Some(entry) = self.entry_mut(key) {
            entry.busy = false;
        }
    }

    pub fn is_busy(&self, key: &str) -> bool {
        self.resolve(key)
            .and_then(|id| self.games.get(&id))
            .map(|entry| entry.busy)
            .unwrap_or(false)
    }

    /// Cancel the running clock, if any. Returns whether one was running.
    pub fn stop_clock(&mut self, key: &str, clocks: &mut impl ClockCanceller) -> bool {
        match self.entry_mut(key).and_then(|entry| entry.clock.take()) {
            Some(clock) => {
                clocks.cancel(clock.handle);
                true
            }
            None => false,
        }
    }

    /// Reserve a clock generation for a playing session.
    pub(crate) fn prepare_clock(&mut self, key: &str) -> Option<(String, u64, GameSession)> {
        let id = self.resolve(key)?;
        let session = self.games.get(&id)?.session.clone();
        if !session.is_playing() {
            return None;
        }
        self.next_generation += 1;
        Some((id, self.next_generation, session))
    }

    pub(crate) fn attach_clock(&mut self, session_id: &str, generation: u64, handle: SpawnHandle) {
        if let Some(entry) = self.games.get_mut(session_id) {
            entry.clock = Some(ClockHandle { handle, generation });
        }
    }

    pub(crate) fn tick(
        &mut self,
        session_id: &str,
        generation: u64,
        clocks: &mut impl ClockCanceller,
    ) -> TickOutcome {
        let Some(entry) = self.games.get_mut(session_id) else {
            return TickOutcome::Stale;
        };
        let current = entry.clock.map(|clock| clock.generation);
        if current != Some(generation) || !entry.session.is_playing() {
            return TickOutcome::Stale;
        }

        let color = entry.session.color_to_move();
        let seat = entry.session.seat_mut(color);
        seat.time_remaining_seconds = seat.time_remaining_seconds.saturating_sub(1);
        if seat.time_remaining_seconds > 0 {
            return TickOutcome::Running(entry.session.clone());
        }

        if let Some(clock) = entry.clock.take() {
            clocks.cancel(clock.handle);
        }
        if let Err(e) = entry.session.transition(GameStatus::Timeout) {
            warn!("Clock expired on session {} but: {}", session_id, e);
            return TickOutcome::Stale;
        }
        info!("{:?} ran out of time in session {}", color, session_id);
        TickOutcome::Expired {
            color,
            session: entry.session.clone(),
        }
    }

    /// Stop the clock, drop both connection bindings and delete the session.
    /// The room-code alias is left behind and no longer resolves.
    pub fn end_session(&mut self, key: &str, clocks: &mut impl ClockCanceller) -> Option<GameSession> {
        let id = self.resolve(key)?;
        self.stop_clock(&id, clocks);
        let entry = self.games.remove(&id)?;
        for connection_id in entry.session.connection_ids() {
            if self.connections.get(connection_id) == Some(&id) {
                self.connections.remove(connection_id);
            }
        }
        info!("Session {} ended with status {:?}", id, entry.session.status);
        Some(entry.session)
    }

    /// Clear the seat bound to this socket. The session keeps running.
    pub fn handle_disconnect(&mut self, connection_id: &str) -> Option<String> {
        let id = self.connections.remove(connection_id)?;
        self.release_seats(&id, connection_id);
        Some(id)
    }

    fn release_seats(&mut self, session_id: &str, connection_id: &str) {
        let Some(entry) = self.games.get_mut(session_id) else {
            return;
        };
        for color in [Color::White, Color::Black] {
            let seat = entry.session.seat_mut(color);
            if seat.is_bound_to(connection_id) {
                seat.connection_id = None;
                info!("{:?} seat of session {} released by {}", color, session_id, connection_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct NoClocks {
        cancelled: usize,
    }

    impl ClockCanceller for NoClocks {
        fn cancel(&mut self, _: SpawnHandle) {
            self.cancelled += 1;
        }
    }

    fn new_session(room_code: &str, session_id: &str) -> NewSession {
        NewSession {
            room_code: room_code.into(),
            session_id: session_id.into(),
            player1_name: "Ann".into(),
            player2_name: "Bob".into(),
            board_state: "start".into(),
            legal_moves: vec!["e2e4".into(), "d2d4".into()],
        }
    }

    /// Ann is white on "c-ann", Bob is black on "c-bob".
    fn seated() -> SessionRegistry {
        let mut sessions = SessionRegistry::new(300);
        sessions.insert_session(new_session("ROOM", "g-1"), false);
        assert_eq!(sessions.register_connection("ROOM", "Ann", "c-ann"), Some(Color::White));
        assert_eq!(sessions.register_connection("g-1", "Bob", "c-bob"), Some(Color::Black));
        sessions
    }

    #[test]
    fn create_session_seats_both_names_with_full_clocks() {
        let mut sessions = SessionRegistry::new(300);
        let session = sessions.create_session(new_session("ROOM", "g-1"));

        let mut names = vec![session.white.name.clone(), session.black.name.clone()];
        names.sort();
        assert_eq!(names, ["Ann", "Bob"]);
        assert!(session.white.has_move);
        assert!(!session.black.has_move);
        assert_eq!(session.white.time_remaining_seconds, 300);
        assert_eq!(session.black.time_remaining_seconds, 300);
        assert_eq!(session.status, GameStatus::Playing);
        assert_eq!(sessions.get("ROOM").unwrap().session_id, "g-1");
    }

    #[test]
    fn color_assignment_uses_both_orders() {
        let mut white_names = std::collections::HashSet::new();
        for i in 0..64 {
            let mut sessions = SessionRegistry::new(300);
            let session = sessions.create_session(new_session("ROOM", &format!("g-{i}")));
            white_names.insert(session.white.name);
        }
        assert_eq!(white_names.len(), 2);
    }

    #[test]
    fn register_connection_rejects_unknown_names_and_sessions() {
        let mut sessions = seated();
        assert_eq!(sessions.register_connection("ROOM", "ann", "c-x"), None);
        assert_eq!(sessions.register_connection("NOPE", "Ann", "c-x"), None);
    }

    #[test]
    fn rebinding_a_seat_drops_the_old_connection() {
        let mut sessions = seated();
        sessions.register_connection("ROOM", "Ann", "c-ann-2");
        assert_eq!(sessions.session_id_for("c-ann"), None);
        assert_eq!(sessions.session_id_for("c-ann-2"), Some("g-1"));
        assert!(sessions.is_players_turn("ROOM", "c-ann-2"));
    }

    #[test]
    fn seating_a_socket_in_another_game_frees_its_old_seat() {
        let mut sessions = seated();
        sessions.insert_session(
            NewSession {
                player1_name: "Cid".into(),
                player2_name: "Dan".into(),
                ..new_session("RM02", "g-2")
            },
            false,
        );

        assert_eq!(sessions.register_connection("RM02", "Cid", "c-ann"), Some(Color::White));
        assert_eq!(sessions.get("ROOM").unwrap().white.connection_id, None);
        assert_eq!(sessions.session_id_for("c-ann"), Some("g-2"));
        assert!(!sessions.is_players_turn("ROOM", "c-ann"));

        // a later disconnect only touches the new game
        assert_eq!(sessions.handle_disconnect("c-ann"), Some("g-2".to_string()));
        assert_eq!(sessions.get("RM02").unwrap().white.connection_id, None);
        assert_eq!(sessions.get("ROOM").unwrap().black.connection_id.as_deref(), Some("c-bob"));
    }

    #[test]
    fn switching_seats_within_a_game_keeps_one_binding() {
        let mut sessions = seated();
        assert_eq!(sessions.register_connection("ROOM", "Bob", "c-ann"), Some(Color::Black));
        let session = sessions.get("ROOM").unwrap();
        assert_eq!(session.white.connection_id, None);
        assert_eq!(session.black.connection_id.as_deref(), Some("c-ann"));
        assert_eq!(sessions.session_id_for("c-bob"), None);
    }

    #[test]
    fn turn_belongs_to_seat_with_move() {
        let sessions = seated();
        assert!(sessions.is_players_turn("ROOM", "c-ann"));
        assert!(!sessions.is_players_turn("ROOM", "c-bob"));
        assert!(!sessions.is_players_turn("ROOM", "stranger"));
        assert!(!sessions.is_players_turn("NOPE", "c-ann"));
    }

    #[test]
    fn apply_move_result_flips_turn_and_clears_offer() {
        let mut sessions = seated();
        sessions.offer_draw("ROOM", "c-bob").unwrap();

        let session = sessions
            .apply_move_result("ROOM", "after-e4".into(), vec!["e7e5".into()])
            .unwrap();
        assert_eq!(session.board_state, "after-e4");
        assert!(!session.white.has_move);
        assert!(session.black.has_move);
        assert_eq!(session.draw_offer_from, None);
        assert!(sessions.is_players_turn("ROOM", "c-bob"));
        assert!(!sessions.is_players_turn("ROOM", "c-ann"));
    }

    #[test]
    fn exactly_one_seat_has_the_move_across_moves() {
        let mut sessions = seated();
        for n in 0..5 {
            let session = sessions
                .apply_move_result("ROOM", format!("pos-{n}"), vec!["x".into()])
                .unwrap();
            assert!(session.white.has_move ^ session.black.has_move);
        }
    }

    #[test]
    fn no_turn_after_game_is_over() {
        let mut sessions = seated();
        let mut clocks = NoClocks::default();
        sessions.resign("ROOM", "c-bob", &mut clocks).unwrap();
        assert!(!sessions.is_players_turn("ROOM", "c-ann"));
        assert!(!sessions.is_players_turn("ROOM", "c-bob"));
        assert!(sessions
            .apply_move_result("ROOM", "x".into(), vec!["y".into()])
            .is_err());
        assert!(sessions.offer_draw("ROOM", "c-ann").is_none());
    }

    #[test]
    fn draw_needs_an_offer_from_the_other_side() {
        let mut sessions = seated();
        let mut clocks = NoClocks::default();

        assert!(sessions.accept_draw("ROOM", "c-bob", &mut clocks).is_none());

        let offered = sessions.offer_draw("ROOM", "c-ann").unwrap();
        assert_eq!(offered.draw_offer_from, Some(Color::White));
        // the offering side cannot accept its own offer
        assert!(sessions.accept_draw("ROOM", "c-ann", &mut clocks).is_none());

        let drawn = sessions.accept_draw("ROOM", "c-bob", &mut clocks).unwrap();
        assert_eq!(drawn.status, GameStatus::Draw);
        assert_eq!(drawn.draw_offer_from, None);
    }

    #[test]
    fn strangers_cannot_offer_draws() {
        let mut sessions = seated();
        assert!(sessions.offer_draw("ROOM", "stranger").is_none());
        assert_eq!(sessions.get("ROOM").unwrap().draw_offer_from, None);
    }

    #[test]
    fn resigning_as_white_makes_black_the_winner() {
        let mut sessions = seated();
        let mut clocks = NoClocks::default();
        let outcome = sessions.resign("ROOM", "c-ann", &mut clocks).unwrap();
        assert_eq!(outcome.winner_name, "Bob");
        assert_eq!(outcome.loser_name, "Ann");
        assert_eq!(outcome.session.status, GameStatus::BlackWon);

        // terminal states are absorbing
        assert!(sessions.resign("ROOM", "c-bob", &mut clocks).is_none());
    }

    #[test]
    fn stop_clock_without_timer_is_a_no_op() {
        let mut sessions = seated();
        let mut clocks = NoClocks::default();
        assert!(!sessions.stop_clock("ROOM", &mut clocks));
        assert!(!sessions.stop_clock("NOPE", &mut clocks));
        assert_eq!(clocks.cancelled, 0);
    }

    #[test]
    fn busy_sessions_reject_a_second_action() {
        let mut sessions = seated();
        sessions.begin_action("ROOM").unwrap();
        assert!(sessions.is_busy("g-1"));
        assert!(matches!(
            sessions.begin_action("g-1"),
            Err(CoordinatorError::ProtocolState(_))
        ));
        sessions.end_action("ROOM");
        assert!(sessions.begin_action("ROOM").is_ok());
    }

    #[test]
    fn disconnect_clears_seat_but_keeps_session() {
        let mut sessions = seated();
        assert_eq!(sessions.handle_disconnect("c-bob"), Some("g-1".to_string()));
        let session = sessions.get("ROOM").unwrap();
        assert_eq!(session.black.connection_id, None);
        assert_eq!(session.black.name, "Bob");
        assert_eq!(session.status, GameStatus::Playing);
        assert_eq!(sessions.handle_disconnect("c-bob"), None);

        // reconnecting under the same name re-binds the seat
        assert_eq!(sessions.register_connection("ROOM", "Bob", "c-bob-2"), Some(Color::Black));
    }

    #[test]
    fn end_session_removes_session_and_connection_index() {
        let mut sessions = seated();
        let mut clocks = NoClocks::default();
        let ended = sessions.end_session("ROOM", &mut clocks).unwrap();
        assert_eq!(ended.session_id, "g-1");
        assert!(sessions.get("ROOM").is_none());
        assert!(sessions.get("g-1").is_none());
        assert_eq!(sessions.session_id_for("c-ann"), None);
        assert_eq!(sessions.session_id_for("c-bob"), None);
        assert_eq!(sessions.len(), 0);
        assert!(sessions.end_session("ROOM", &mut clocks).is_none());
    }

    #[test]
    fn reused_room_code_rebinds_alias_to_the_new_session() {
        let mut sessions = seated();
        let mut clocks = NoClocks::default();
        sessions.end_session("ROOM", &mut clocks);

        sessions.insert_session(new_session("ROOM", "g-2"), false);
        assert_eq!(sessions.get("ROOM").unwrap().session_id, "g-2");
        assert!(sessions.get("g-1").is_none());
    }

    #[test]
    fn rebinding_alias_does_not_retract_the_old_sessions_direct_lookup() {
        let mut sessions = seated();
        sessions.insert_session(new_session("ROOM", "g-2"), false);

        assert_eq!(sessions.get("ROOM").unwrap().session_id, "g-2");
        let old = sessions.get("g-1").unwrap();
        assert_eq!(old.session_id, "g-1");
        assert_eq!(old.white.connection_id.as_deref(), Some("c-ann"));
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn conclude_applies_terminal_status_once() {
        let mut sessions = seated();
        let mut clocks = NoClocks::default();
        let session = sessions.conclude("ROOM", GameStatus::WhiteWon, &mut clocks).unwrap();
        assert_eq!(session.status, GameStatus::WhiteWon);
        assert!(sessions.conclude("ROOM", GameStatus::Draw, &mut clocks).is_err());
    }
}
