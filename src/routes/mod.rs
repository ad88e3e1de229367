use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use log::error;
use serde_json::json;

use crate::models::AppState;
use crate::websocket::LookupSession;

/// Liveness of this process only.
pub async fn health(app_state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "uptimeSeconds": app_state.started_at.elapsed().as_secs(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Ready when the chess backend answers its health check.
pub async fn ready(app_state: web::Data<AppState>) -> impl Responder {
    match app_state.backend.health().await {
        Ok(backend) => HttpResponse::Ok().json(json!({
            "status": "ready",
            "backend": backend,
            "timestamp": Utc::now().to_rfc3339(),
        })),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "not ready",
                "details": e.to_string(),
                "timestamp": Utc::now().to_rfc3339(),
            }))
        }
    }
}

pub async fn backend_ping(app_state: web::Data<AppState>) -> impl Responder {
    match app_state.backend.health().await {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(e) => {
            error!("Backend ping failed: {}", e);
            HttpResponse::BadGateway().json(json!({ "error": e.to_string() }))
        }
    }
}

pub async fn backend_game(app_state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let session_id = path.into_inner();
    match app_state.backend.game_state(&session_id).await {
        Ok(state) => HttpResponse::Ok().json(state),
        Err(e) => {
            error!("Fetching backend state of {} failed: {}", session_id, e);
            HttpResponse::BadGateway().json(json!({ "error": e.to_string() }))
        }
    }
}

/// Snapshot of a live session, by session id or room code.
pub async fn session_snapshot(app_state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let key = path.into_inner();
    match app_state.server.send(LookupSession { key: key.clone() }).await {
        Ok(Some(session)) => HttpResponse::Ok().json(session),
        Ok(None) => HttpResponse::NotFound().json(json!({ "error": format!("Game {} not found", key) })),
        Err(e) => {
            error!("Coordinator unavailable: {}", e);
            HttpResponse::InternalServerError().json(json!({ "error": "coordinator unavailable" }))
        }
    }
}

/// Configure the HTTP routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ws").route(web::get().to(crate::websocket::ws_index)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/ready").route(web::get().to(ready)))
        .service(web::resource("/backend/ping").route(web::get().to(backend_ping)))
        .service(web::resource("/backend/games/{session_id}").route(web::get().to(backend_game)))
        .service(web::resource("/games/{key}").route(web::get().to(session_snapshot)));
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix::Actor;
    use actix_web::{http::StatusCode, test, App};
    use futures::future::{self, BoxFuture, FutureExt};

    use super::*;
    use crate::backend::{BackendError, BoardUpdate, ChessBackend, CreatedGame, DrawResponse, HealthStatus};
    use crate::websocket::GameServer;

    struct Backend {
        healthy: bool,
    }

    fn unavailable<T: Send + 'static>() -> BoxFuture<'static, Result<T, BackendError>> {
        future::ready(Err(BackendError::Status {
            status: 503,
            message: "down".into(),
        }))
        .boxed()
    }

    impl ChessBackend for Backend {
        fn create_game(&self, _: &str) -> BoxFuture<'static, Result<CreatedGame, BackendError>> {
            unavailable()
        }

        fn game_state(&self, session_id: &str) -> BoxFuture<'static, Result<BoardUpdate, BackendError>> {
            if !self.healthy {
                return unavailable();
            }
            future::ready(Ok(BoardUpdate {
                board_state: format!("fen-of-{}", session_id),
                legal_moves: vec!["e2e4".into()],
                game_status: None,
            }))
            .boxed()
        }

        fn make_move(&self, _: &str, _: &str) -> BoxFuture<'static, Result<BoardUpdate, BackendError>> {
            unavailable()
        }

        fn offer_draw(&self, _: &str) -> BoxFuture<'static, Result<DrawResponse, BackendError>> {
            unavailable()
        }

        fn accept_draw(&self, _: &str) -> BoxFuture<'static, Result<DrawResponse, BackendError>> {
            unavailable()
        }

        fn health(&self) -> BoxFuture<'static, Result<HealthStatus, BackendError>> {
            if !self.healthy {
                return unavailable();
            }
            future::ready(Ok(HealthStatus { status: "UP".into() })).boxed()
        }
    }

    fn state(healthy: bool) -> web::Data<AppState> {
        let backend: Arc<dyn ChessBackend> = Arc::new(Backend { healthy });
        let server = GameServer::new(backend.clone(), 300).start();
        web::Data::new(AppState::new(server, backend))
    }

    #[actix_web::test]
    async fn health_reports_uptime() {
        let app = test::init_service(App::new().app_data(state(false)).configure(configure_routes)).await;
        let resp: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp["status"], "ok");
        assert!(resp["uptimeSeconds"].is_u64());
        assert!(resp["timestamp"].is_string());
    }

    #[actix_web::test]
    async fn ready_follows_backend_health() {
        let app = test::init_service(App::new().app_data(state(true)).configure(configure_routes)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/ready").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let app = test::init_service(App::new().app_data(state(false)).configure(configure_routes)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/ready").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn backend_proxies_map_failures_to_bad_gateway() {
        let app = test::init_service(App::new().app_data(state(true)).configure(configure_routes)).await;
        let resp: serde_json::Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/backend/games/g-7").to_request(),
        )
        .await;
        assert_eq!(resp["fen"], "fen-of-g-7");

        let app = test::init_service(App::new().app_data(state(false)).configure(configure_routes)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/backend/ping").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[actix_web::test]
    async fn unknown_session_is_not_found() {
        let app = test::init_service(App::new().app_data(state(true)).configure(configure_routes)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/games/ABCD").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
