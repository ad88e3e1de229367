use actix::prelude::*;
use log::{debug, error, info, warn};

use super::server::GameServer;
use crate::backend::{BackendError, CreatedGame};
use crate::error::CoordinatorError;
use crate::game::NewSession;
use crate::models::{CreateLobby, JoinLobby, LobbyPayload, Scope, ServerMessage};

impl GameServer {
    pub(super) fn handle_lobby_create(&mut self, connection_id: String, payload: CreateLobby) {
        match self.rooms.create_room(&connection_id, payload.name.trim()) {
            Ok(lobby) => {
                let message = format!("Room {} created", lobby.room_code);
                self.send_to(
                    &connection_id,
                    &ServerMessage::LobbyCreated(LobbyPayload::new(&lobby, message)),
                );
            }
            Err(e) => self.send_error(&connection_id, Scope::Lobby, &CoordinatorError::from(e)),
        }
    }

    pub(super) fn handle_lobby_join(
        &mut self,
        connection_id: String,
        payload: JoinLobby,
        ctx: &mut Context<Self>,
    ) {
        let name = payload.name.trim();
        let outcome = match self.rooms.join_room(&payload.room_code, &connection_id, name) {
            Ok(outcome) => outcome,
            Err(e) => return self.send_error(&connection_id, Scope::Lobby, &CoordinatorError::from(e)),
        };

        let update = ServerMessage::LobbyUpdate(LobbyPayload::new(&outcome.lobby, format!("{} joined.", name)));
        self.broadcast_to_lobby(&outcome.lobby, &update);

        if let Some(handoff) = outcome.handoff {
            self.start_handoff(payload.room_code, handoff, ctx);
        }
    }

    /// The room is full: ask the backend for a game, then open the session.
    /// The answer only applies while `handoff` is still the room's current one.
    fn start_handoff(&mut self, room_code: String, handoff: u64, ctx: &mut Context<Self>) {
        info!("Creating backend game for room {} (handoff {})", room_code, handoff);
        let request = self.backend.create_game(&room_code);
        ctx.spawn(
            request
                .into_actor(self)
                .map(move |result, act, ctx| act.finish_handoff(room_code, handoff, result, ctx)),
        );
    }

    fn finish_handoff(
        &mut self,
        room_code: String,
        handoff: u64,
        result: Result<CreatedGame, BackendError>,
        ctx: &mut Context<Self>,
    ) {
        let created = match result {
            Ok(created) => created,
            Err(e) => {
                error!("Game creation for room {} failed: {}", room_code, e);
                let Some((lobby, dropped)) = self.rooms.rollback_handoff(&room_code, handoff) else {
                    debug!("Handoff {} of room {} is stale, ignoring its failure", handoff, room_code);
                    return;
                };
                let failure = Scope::Lobby.error("Failed to create game. Please try again.");
                self.broadcast_to_lobby(&lobby, &failure);
                for player in &dropped {
                    self.send_to(&player.connection_id, &failure);
                }
                let update = ServerMessage::LobbyUpdate(LobbyPayload::new(
                    &lobby,
                    "Game could not be started. Waiting for an opponent.",
                ));
                self.broadcast_to_lobby(&lobby, &update);
                return;
            }
        };

        let Some(lobby) = self.rooms.complete_handoff(&room_code, handoff) else {
            warn!(
                "Room {} changed while its game {} was being created (handoff {}); not starting it",
                room_code, created.session_id, handoff
            );
            return;
        };
        let [first, second] = match lobby.players.as_slice() {
            [first, second] => [first.display_name.clone(), second.display_name.clone()],
            _ => return,
        };

        let session = self.sessions.create_session(NewSession {
            room_code: room_code.clone(),
            session_id: created.session_id,
            player1_name: first,
            player2_name: second,
            board_state: created.board_state,
            legal_moves: created.legal_moves,
        });
        self.broadcast_to_lobby(&lobby, &ServerMessage::GameStart(session.clone()));
        self.start_game_clock(&session.session_id, ctx);
    }
}
