use std::collections::HashMap;
use std::sync::Arc;

use actix::prelude::*;
use log::{debug, info, warn};

use crate::backend::ChessBackend;
use crate::error::CoordinatorError;
use crate::game::{ClockHost, SessionRegistry};
use crate::lobby::{Departure, RoomRegistry};
use crate::models::{
    ChessWebSocketMessage, ClientMessage, ForceDisconnect, GameSession, Lobby, LobbyPayload, Notice,
    Scope, ServerMessage,
};

/// Outbound side of one socket.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub outbound: Recipient<ChessWebSocketMessage>,
    pub close: Recipient<ForceDisconnect>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub id: String,
    pub handle: ConnectionHandle,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub id: String,
}

/// A validated event from a socket.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct ClientEvent {
    pub connection_id: String,
    pub message: ClientMessage,
}

#[derive(Message)]
#[rtype(result = "Option<GameSession>")]
pub struct LookupSession {
    pub key: String,
}

/// The session coordinator: single owner of lobbies, sessions, clocks and
/// socket handles. Every client event and every clock tick runs on this
/// actor, one at a time.
pub struct GameServer {
    pub(super) backend: Arc<dyn ChessBackend>,
    pub(super) rooms: RoomRegistry,
    pub(super) sessions: SessionRegistry,
    connections: HashMap<String, ConnectionHandle>,
}

impl GameServer {
    pub fn new(backend: Arc<dyn ChessBackend>, clock_seconds: u32) -> Self {
        Self::with_rooms(backend, clock_seconds, RoomRegistry::new())
    }

    pub fn with_rooms(backend: Arc<dyn ChessBackend>, clock_seconds: u32, rooms: RoomRegistry) -> Self {
        Self {
            backend,
            rooms,
            sessions: SessionRegistry::new(clock_seconds),
            connections: HashMap::new(),
        }
    }

    pub(super) fn send_to(&self, connection_id: &str, message: &ServerMessage) {
        let Some(handle) = self.connections.get(connection_id) else {
            debug!("Connection {} not found, dropping message", connection_id);
            return;
        };
        if let Some(text) = message.to_json() {
            handle.outbound.do_send(ChessWebSocketMessage(text));
        }
    }

    fn send_to_all<'a>(&self, connection_ids: impl IntoIterator<Item = &'a str>, message: &ServerMessage) {
        let Some(text) = message.to_json() else {
            return;
        };
        for connection_id in connection_ids {
            match self.connections.get(connection_id) {
                Some(handle) => handle.outbound.do_send(ChessWebSocketMessage(text.clone())),
                None => debug!("Connection {} not found in sessions", connection_id),
            }
        }
    }

    pub(super) fn broadcast_to_lobby(&self, lobby: &Lobby, message: &ServerMessage) {
        debug!("Broadcasting to lobby {}", lobby.room_code);
        self.send_to_all(lobby.connection_ids(), message);
    }

    /// Send to every seat that currently has a socket bound.
    pub(super) fn broadcast_to_session(&self, session: &GameSession, message: &ServerMessage) {
        self.send_to_all(session.connection_ids(), message);
    }

    pub(super) fn send_error(&self, connection_id: &str, scope: Scope, err: &CoordinatorError) {
        warn!("Rejected request from {}: {}", connection_id, err);
        self.send_to(connection_id, &scope.error(err.client_message()));
    }

    pub(super) fn force_disconnect(&mut self, connection_id: &str, reason: &str) {
        if let Some(handle) = self.connections.get(connection_id) {
            handle.close.do_send(ForceDisconnect {
                reason: reason.to_string(),
            });
        }
    }
}

impl Actor for GameServer {
    type Context = Context<Self>;

    fn started(&mut self, _: &mut Self::Context) {
        info!("Session coordinator started");
    }
}

impl ClockHost for GameServer {
    fn sessions(&mut self) -> &mut SessionRegistry {
        &mut self.sessions
    }
}

impl Handler<Connect> for GameServer {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Context<Self>) {
        self.connections.insert(msg.id.clone(), msg.handle);
        info!(
            "Client connected: {} ({} active, {} lobbies, {} games)",
            msg.id,
            self.connections.len(),
            self.rooms.len(),
            self.sessions.len()
        );
    }
}

impl Handler<Disconnect> for GameServer {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        self.connections.remove(&msg.id);
        info!("Client disconnected: {} ({} active)", msg.id, self.connections.len());

        for departure in self.rooms.handle_disconnect(&msg.id) {
            match departure {
                Departure::Updated(lobby) => {
                    let update = ServerMessage::LobbyUpdate(LobbyPayload::new(&lobby, "Opponent disconnected."));
                    self.broadcast_to_lobby(&lobby, &update);
                }
                Departure::Deleted(room_code) => debug!("Lobby {} closed with its last player", room_code),
            }
        }

        if let Some(session_id) = self.sessions.handle_disconnect(&msg.id) {
            if let Some(session) = self.sessions.get(&session_id) {
                let notice =
                    ServerMessage::OpponentDisconnected(Notice::new("Your opponent has disconnected."));
                self.broadcast_to_session(session, &notice);
            }
        }
    }
}

impl Handler<ClientEvent> for GameServer {
    type Result = ();

    fn handle(&mut self, msg: ClientEvent, ctx: &mut Context<Self>) {
        let ClientEvent {
            connection_id,
            message,
        } = msg;
        debug!("Event from {}: {:?}", connection_id, message);

        match message {
            ClientMessage::LobbyCreate(payload) => self.handle_lobby_create(connection_id, payload),
            ClientMessage::LobbyJoin(payload) => self.handle_lobby_join(connection_id, payload, ctx),
            ClientMessage::GameJoin(payload) => self.handle_game_join(connection_id, payload),
            ClientMessage::GameMove(payload) => self.handle_move(connection_id, payload, ctx),
            ClientMessage::DrawOffer(payload) => self.handle_draw_offer(connection_id, payload, ctx),
            ClientMessage::DrawAccept(payload) => self.handle_draw_accept(connection_id, payload, ctx),
            ClientMessage::Resign(payload) => self.handle_resign(connection_id, payload, ctx),
        }
    }
}

impl Handler<LookupSession> for GameServer {
    type Result = Option<GameSession>;

    fn handle(&mut self, msg: LookupSession, _: &mut Context<Self>) -> Self::Result {
        self.sessions.get(&msg.key).cloned()
    }
}
