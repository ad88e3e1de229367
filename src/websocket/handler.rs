use actix::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{debug, info, warn};
use uuid::Uuid;

use super::server::{ClientEvent, Connect, ConnectionHandle, Disconnect, GameServer};
use crate::models::*;

/// One client socket. Parses and validates frames, then hands them to the
/// coordinator; everything it writes back comes from the coordinator.
pub struct ChessWebSocket {
    pub id: String,
    pub server: Addr<GameServer>,
}

impl ChessWebSocket {
    pub fn new(server: Addr<GameServer>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            server,
        }
    }

    fn send(&self, message: &ServerMessage, ctx: &mut ws::WebsocketContext<Self>) {
        if let Some(text) = message.to_json() {
            ctx.text(text);
        }
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Error parsing client message from {}: {}", self.id, e);
                let reply = Scope::of_raw(text).error(format!("Invalid message format: {}", e));
                return self.send(&reply, ctx);
            }
        };
        if let Err(e) = message.validate() {
            warn!("Invalid {:?} payload from {}: {}", message.scope(), self.id, e);
            return self.send(&message.scope().error(e.client_message()), ctx);
        }

        self.server.do_send(ClientEvent {
            connection_id: self.id.clone(),
            message,
        });
    }
}

impl Actor for ChessWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let addr = ctx.address();
        self.server.do_send(Connect {
            id: self.id.clone(),
            handle: ConnectionHandle {
                outbound: addr.clone().recipient(),
                close: addr.recipient(),
            },
        });
        info!("WebSocket connection started: {}", self.id);
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        self.server.do_send(Disconnect { id: self.id.clone() });
        info!("WebSocket connection closed: {}", self.id);
        Running::Stop
    }
}

impl Handler<ChessWebSocketMessage> for ChessWebSocket {
    type Result = ();

    fn handle(&mut self, msg: ChessWebSocketMessage, ctx: &mut Self::Context) {
        debug!("Forwarding message to client {}: {}", self.id, msg.0);
        ctx.text(msg.0);
    }
}

impl Handler<ForceDisconnect> for ChessWebSocket {
    type Result = ();

    fn handle(&mut self, msg: ForceDisconnect, ctx: &mut Self::Context) {
        warn!("Closing connection {}: {}", self.id, msg.reason);
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Policy,
            description: Some(msg.reason),
        }));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChessWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => {
                debug!("Received text message from {}: {}", self.id, text);
                self.handle_text(text.as_ref(), ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                warn!("Binary messages are not supported");
                self.send(&Scope::Lobby.error("Binary messages are not supported"), ctx);
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Connection closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            _ => {
                ctx.stop();
            }
        }
    }
}

/// WebSocket connection handler
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let ws = ChessWebSocket::new(app_state.server.clone());
    info!("New WebSocket connection request, assigned id {}", ws.id);
    ws::start(ws, &req, stream)
}
