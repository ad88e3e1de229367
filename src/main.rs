use std::io;
use std::sync::Arc;
use std::time::Duration;

use actix::Actor;
use actix_web::{web, App, HttpServer};
use log::{error, info};

mod backend;
mod config;
mod error;
mod game;
mod lobby;
mod models;
mod routes;
mod websocket;

use backend::{ChessBackend, HttpBackendClient};
use config::Config;
use models::AppState;
use websocket::GameServer;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(io::Error::new(io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(config.log_level.as_str()));

    let client = HttpBackendClient::from_config(&config)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    let backend: Arc<dyn ChessBackend> = Arc::new(client);

    if config.verify_backend_on_startup {
        match backend.health().await {
            Ok(health) => info!("Chess backend at {} is {}", config.backend_url, health.status),
            Err(e) => {
                error!("Chess backend at {} is not reachable: {}", config.backend_url, e);
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, e.to_string()));
            }
        }
    }

    let server = GameServer::new(backend.clone(), config.clock_seconds).start();
    let app_state = web::Data::new(AppState::new(server, backend));

    info!(
        "Starting chess session coordinator at http://{} ({}s clocks, backend timeout {:?})",
        config.bind_address,
        config.clock_seconds,
        Duration::from_millis(config.request_timeout_ms)
    );

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(routes::configure_routes)
    })
    .bind(config.bind_address.as_str())?
    .run()
    .await
}
