use std::sync::Arc;
use std::time::Instant;

use actix::Addr;

use crate::backend::ChessBackend;
use crate::websocket::GameServer;

/// Application state shared between HTTP workers
pub struct AppState {
    pub server: Addr<GameServer>,
    pub backend: Arc<dyn ChessBackend>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(server: Addr<GameServer>, backend: Arc<dyn ChessBackend>) -> Self {
        Self {
            server,
            backend,
            started_at: Instant::now(),
        }
    }
}
