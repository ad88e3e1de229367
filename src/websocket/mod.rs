mod game_handlers;
pub mod handler;
mod lobby_handlers;
pub mod server;


pub use handler::ws_index;
pub use server::{GameServer, LookupSession};
