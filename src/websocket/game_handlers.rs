use actix::prelude::*;
use log::{debug, error, info, warn};

use super::server::GameServer;
use crate::backend::{BackendError, BoardUpdate, DrawResponse};
use crate::error::CoordinatorError;
use crate::game::start_clock;
use crate::models::{
    ClockPayload, Color, GameJoin, GameMove, GameSession, GameStatus, Notice, RoomRef, Scope,
    ServerMessage,
};

const MOVE_REJECTED: &str = "Invalid move or game service unavailable";

impl GameServer {
    /// Session id and seat color of a connection in a game that is still running.
    fn playing_seat(&self, room_code: &str, connection_id: &str) -> Result<(String, Color), CoordinatorError> {
        let session = self
            .sessions
            .get(room_code)
            .ok_or_else(|| CoordinatorError::NotFound(room_code.to_string()))?;
        if !session.is_playing() {
            return Err(CoordinatorError::finished());
        }
        let color = session
            .color_of(connection_id)
            .ok_or_else(|| CoordinatorError::AccessDenied {
                room_code: room_code.to_string(),
                player_name: format!("connection {}", connection_id),
            })?;
        Ok((session.session_id.clone(), color))
    }

    pub(super) fn start_game_clock(&mut self, key: &str, ctx: &mut Context<Self>) {
        start_clock(
            self,
            ctx,
            key,
            |act: &mut GameServer, _ctx, session| {
                act.broadcast_to_session(session, &ServerMessage::Clock(ClockPayload::from(session)));
            },
            |act: &mut GameServer, ctx, expired, session| {
                let winner = session.seat(expired.opponent()).name.clone();
                let loser = session.seat(expired).name.clone();
                let message = format!("{} ran out of time.", loser);
                act.finish_game(&session, Some((winner, loser)), message, ctx);
            },
        );
    }

    /// Broadcast the terminal frames and drop the session.
    fn finish_game(
        &mut self,
        session: &GameSession,
        result: Option<(String, String)>,
        message: String,
        ctx: &mut Context<Self>,
    ) {
        if let Some((winner, loser)) = result {
            self.broadcast_to_session(session, &ServerMessage::GameResult { winner, loser });
        }
        info!("Game {} finished: {}", session.room_code, message);
        self.broadcast_to_session(
            session,
            &ServerMessage::GameFinished {
                message,
                status: session.status,
            },
        );
        self.sessions.end_session(&session.session_id, ctx);
    }

    pub(super) fn handle_game_join(&mut self, connection_id: String, payload: GameJoin) {
        let player_name = payload.player_name.trim();
        if self.sessions.get(&payload.room_code).is_none() {
            let err = CoordinatorError::NotFound(payload.room_code);
            return self.send_error(&connection_id, Scope::Game, &err);
        }

        let previous_game = self.sessions.session_id_for(&connection_id).map(str::to_string);
        let Some(color) = self
            .sessions
            .register_connection(&payload.room_code, player_name, &connection_id)
        else {
            let err = CoordinatorError::AccessDenied {
                room_code: payload.room_code,
                player_name: player_name.to_string(),
            };
            self.send_error(&connection_id, Scope::Game, &err);
            self.force_disconnect(&connection_id, "not a player in this game");
            return;
        };

        let Some(session) = self.sessions.get(&payload.room_code).cloned() else {
            return;
        };
        info!("{} joined game {} as {:?}", player_name, session.room_code, color);
        if let Some(left) = previous_game.filter(|id| *id != session.session_id) {
            if let Some(abandoned) = self.sessions.get(&left) {
                info!("Connection {} left game {} for {}", connection_id, abandoned.room_code, session.room_code);
                let notice = ServerMessage::OpponentDisconnected(Notice::new("Your opponent has disconnected."));
                self.broadcast_to_session(abandoned, &notice);
            }
        }

        self.send_to(
            &connection_id,
            &ServerMessage::GameJoined {
                message: format!("You are successfully connected to game {}", session.room_code),
                color,
            },
        );
        if let Some(opponent) = session.seat(color.opponent()).connection_id.as_deref() {
            self.send_to(opponent, &ServerMessage::OpponentReady(Notice::new("Opponent has connected.")));
        }
        self.send_to(&connection_id, &ServerMessage::GameUpdate(session.clone()));
        self.send_to(&connection_id, &ServerMessage::Clock(ClockPayload::from(&session)));
        if session.draw_offer_from == Some(color.opponent()) {
            self.send_to(
                &connection_id,
                &ServerMessage::DrawOffered {
                    from: color.opponent(),
                },
            );
        }
    }

    pub(super) fn handle_move(&mut self, connection_id: String, payload: GameMove, ctx: &mut Context<Self>) {
        let (session_id, color) = match self.playing_seat(&payload.room_code, &connection_id) {
            Ok(seat) => seat,
            Err(CoordinatorError::AccessDenied { room_code, .. }) => {
                let err = CoordinatorError::AccessDenied {
                    room_code,
                    player_name: payload.player_name,
                };
                return self.send_error(&connection_id, Scope::Game, &err);
            }
            Err(e) => return self.send_error(&connection_id, Scope::Game, &e),
        };
        if !self.sessions.is_players_turn(&session_id, &connection_id) {
            return self.send_error(&connection_id, Scope::Game, &CoordinatorError::OutOfTurn);
        }
        if let Err(e) = self.sessions.begin_action(&session_id) {
            return self.send_error(&connection_id, Scope::Game, &e);
        }

        debug!("{:?} plays {} in game {}", color, payload.chess_move, payload.room_code);
        let request = self.backend.make_move(&session_id, payload.chess_move.trim());
        ctx.spawn(request.into_actor(self).map(move |result, act, ctx| {
            act.finish_move(session_id, connection_id, color, result, ctx)
        }));
    }

    fn finish_move(
        &mut self,
        session_id: String,
        connection_id: String,
        mover: Color,
        result: Result<BoardUpdate, BackendError>,
        ctx: &mut Context<Self>,
    ) {
        self.sessions.end_action(&session_id);
        let update = match result {
            Ok(update) => update,
            Err(e) => {
                error!("Move in session {} rejected by backend: {}", session_id, e);
                self.send_to(&connection_id, &Scope::Game.error(MOVE_REJECTED));
                return;
            }
        };
        if !self.sessions.get(&session_id).map(GameSession::is_playing).unwrap_or(false) {
            debug!("Session {} ended while its move was pending; discarding result", session_id);
            return;
        }

        let finished = update.is_final();
        let drawn = update.is_drawn();
        self.sessions.stop_clock(&session_id, ctx);
        let session = match self
            .sessions
            .apply_move_result(&session_id, update.board_state, update.legal_moves)
        {
            Ok(session) => session,
            Err(e) => {
                error!("Could not apply move to session {}: {}", session_id, e);
                return self.send_error(&connection_id, Scope::Game, &e);
            }
        };
        self.broadcast_to_session(&session, &ServerMessage::GameUpdate(session.clone()));

        if !finished {
            self.start_game_clock(&session_id, ctx);
            return;
        }

        let status = if drawn {
            GameStatus::Draw
        } else {
            GameStatus::won_by(mover)
        };
        let session = match self.sessions.conclude(&session_id, status, ctx) {
            Ok(session) => session,
            Err(e) => {
                error!("Could not end session {}: {}", session_id, e);
                return self.send_error(&connection_id, Scope::Game, &e);
            }
        };
        if drawn {
            self.finish_game(&session, None, "Stalemate. The game is drawn.".to_string(), ctx);
        } else {
            let winner = session.seat(mover).name.clone();
            let loser = session.seat(mover.opponent()).name.clone();
            let message = format!("Checkmate. {} wins.", winner);
            self.finish_game(&session, Some((winner, loser)), message, ctx);
        }
    }

    pub(super) fn handle_draw_offer(&mut self, connection_id: String, payload: RoomRef, ctx: &mut Context<Self>) {
        let session_id = match self.playing_seat(&payload.room_code, &connection_id) {
            Ok((session_id, _)) => session_id,
            Err(e) => return self.send_error(&connection_id, Scope::Game, &e),
        };
        if let Err(e) = self.sessions.begin_action(&session_id) {
            return self.send_error(&connection_id, Scope::Game, &e);
        }

        let request = self.backend.offer_draw(&session_id);
        ctx.spawn(request.into_actor(self).map(move |result, act, _ctx| {
            act.finish_draw_offer(session_id, connection_id, result)
        }));
    }

    fn finish_draw_offer(
        &mut self,
        session_id: String,
        connection_id: String,
        result: Result<DrawResponse, BackendError>,
    ) {
        self.sessions.end_action(&session_id);
        if let Err(e) = backend_draw_outcome(&session_id, result) {
            return self.send_error(&connection_id, Scope::Game, &e);
        }

        match self.sessions.offer_draw(&session_id, &connection_id) {
            Some(session) => {
                if let Some(from) = session.draw_offer_from {
                    self.broadcast_to_session(&session, &ServerMessage::DrawOffered { from });
                }
            }
            None => self.send_error(&connection_id, Scope::Game, &CoordinatorError::finished()),
        }
    }

    pub(super) fn handle_draw_accept(&mut self, connection_id: String, payload: RoomRef, ctx: &mut Context<Self>) {
        let session_id = match self.playing_seat(&payload.room_code, &connection_id) {
            Ok((session_id, _)) => session_id,
            Err(e) => return self.send_error(&connection_id, Scope::Game, &e),
        };
        if !self.sessions.can_accept_draw(&session_id, &connection_id) {
            let err = CoordinatorError::ProtocolState("There is no draw offer to accept".to_string());
            return self.send_error(&connection_id, Scope::Game, &err);
        }
        if let Err(e) = self.sessions.begin_action(&session_id) {
            return self.send_error(&connection_id, Scope::Game, &e);
        }

        let request = self.backend.accept_draw(&session_id);
        ctx.spawn(request.into_actor(self).map(move |result, act, ctx| {
            act.finish_draw_accept(session_id, connection_id, result, ctx)
        }));
    }

    fn finish_draw_accept(
        &mut self,
        session_id: String,
        connection_id: String,
        result: Result<DrawResponse, BackendError>,
        ctx: &mut Context<Self>,
    ) {
        self.sessions.end_action(&session_id);
        if let Err(e) = backend_draw_outcome(&session_id, result) {
            return self.send_error(&connection_id, Scope::Game, &e);
        }

        match self.sessions.accept_draw(&session_id, &connection_id, ctx) {
            Some(session) => self.finish_game(&session, None, "Draw agreed.".to_string(), ctx),
            None => {
                let err = CoordinatorError::ProtocolState("There is no draw offer to accept".to_string());
                self.send_error(&connection_id, Scope::Game, &err);
            }
        }
    }

    pub(super) fn handle_resign(&mut self, connection_id: String, payload: RoomRef, ctx: &mut Context<Self>) {
        let session_id = match self.playing_seat(&payload.room_code, &connection_id) {
            Ok((session_id, _)) => session_id,
            Err(e) => return self.send_error(&connection_id, Scope::Game, &e),
        };
        if self.sessions.is_busy(&session_id) {
            return self.send_error(&connection_id, Scope::Game, &CoordinatorError::busy());
        }

        match self.sessions.resign(&session_id, &connection_id, ctx) {
            Some(outcome) => {
                let message = format!("{} resigned.", outcome.loser_name);
                let result = Some((outcome.winner_name, outcome.loser_name));
                self.finish_game(&outcome.session, result, message, ctx);
            }
            None => self.send_error(&connection_id, Scope::Game, &CoordinatorError::finished()),
        }
    }
}

/// A backend that does not implement draws is not a failure: the draw is
/// then handled locally only.
fn backend_draw_outcome(
    session_id: &str,
    result: Result<DrawResponse, BackendError>,
) -> Result<(), CoordinatorError> {
    match result.map_err(CoordinatorError::from) {
        Ok(response) => {
            debug!("Backend draw response for {}: {}", session_id, response.message);
            Ok(())
        }
        Err(CoordinatorError::BackendUnimplemented(reason)) => {
            warn!("Backend has no draw support ({}); handling session {} locally", reason, session_id);
            Ok(())
        }
        Err(e) => {
            error!("Draw request for session {} failed: {}", session_id, e);
            Err(e)
        }
    }
}
