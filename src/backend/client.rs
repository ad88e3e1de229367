use std::future::Future;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use log::{debug, error, warn};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{
    mentions_unimplemented, BackendError, BoardUpdate, ChessBackend, CreatedGame, DrawResponse,
    HealthStatus,
};
use crate::config::Config;

/// Fixed-delay retry applied to every backend call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// HTTP client for the authoritative chess backend.
#[derive(Clone)]
pub struct HttpBackendClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    retry: RetryPolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientSetupError {
    #[error("invalid backend URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("could not build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

impl HttpBackendClient {
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ClientSetupError> {
        let parsed = Url::parse(base_url).map_err(|e| ClientSetupError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ClientSetupError::InvalidUrl {
                url: base_url.to_string(),
                reason: "URL cannot carry a path".to_string(),
            });
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: parsed,
            token: token.into(),
            retry,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ClientSetupError> {
        Self::new(
            &config.backend_url,
            config.backend_token.clone(),
            Duration::from_millis(config.request_timeout_ms),
            RetryPolicy {
                attempts: config.retry_attempts.max(1),
                delay: Duration::from_millis(config.retry_delay_ms),
            },
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(BackendError::from_response(status.as_u16(), body))
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            debug!("Backend {} attempt {}/{}", operation, attempt, attempts);
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= attempts => {
                    error!("Backend {} failed after {} attempts: {}", operation, attempts, err);
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        "Backend {} failed on attempt {}/{}: {}",
                        operation, attempt, attempts, err
                    );
                    actix_rt::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn draw_call(&self, operation: &str, action: &str, session_id: &str) -> Result<DrawResponse, BackendError> {
        let url = self.endpoint(&["api", "game", session_id, "draw", action]);
        let response: DrawResponse = self
            .with_retry(operation, || self.execute(self.http.post(url.clone())))
            .await?;
        if mentions_unimplemented(&response.message) {
            return Err(BackendError::Unimplemented(response.message));
        }
        Ok(response)
    }
}

impl ChessBackend for HttpBackendClient {
    fn create_game(&self, room_code: &str) -> BoxFuture<'static, Result<CreatedGame, BackendError>> {
        let this = self.clone();
        let url = self.endpoint(&["api", "game", "create", room_code]);
        async move {
            this.with_retry("createGame", || this.execute(this.http.post(url.clone())))
                .await
        }
        .boxed()
    }

    fn game_state(&self, session_id: &str) -> BoxFuture<'static, Result<BoardUpdate, BackendError>> {
        let this = self.clone();
        let url = self.endpoint(&["api", "game", "state", session_id]);
        async move {
            this.with_retry("getGameState", || this.execute(this.http.get(url.clone())))
                .await
        }
        .boxed()
    }

    fn make_move(
        &self,
        session_id: &str,
        chess_move: &str,
    ) -> BoxFuture<'static, Result<BoardUpdate, BackendError>> {
        let this = self.clone();
        let url = self.endpoint(&["api", "game", "move", session_id]);
        let body = json!({ "move": chess_move });
        async move {
            this.with_retry("makeMove", || {
                this.execute(this.http.post(url.clone()).json(&body))
            })
            .await
        }
        .boxed()
    }

    fn offer_draw(&self, session_id: &str) -> BoxFuture<'static, Result<DrawResponse, BackendError>> {
        let this = self.clone();
        let session_id = session_id.to_string();
        async move { this.draw_call("offerDraw", "offer", &session_id).await }.boxed()
    }

    fn accept_draw(&self, session_id: &str) -> BoxFuture<'static, Result<DrawResponse, BackendError>> {
        let this = self.clone();
        let session_id = session_id.to_string();
        async move { this.draw_call("acceptDraw", "accept", &session_id).await }.boxed()
    }

    fn health(&self) -> BoxFuture<'static, Result<HealthStatus, BackendError>> {
        let this = self.clone();
        let url = self.endpoint(&["api", "health"]);
        async move {
            this.with_retry("health", || this.execute(this.http.get(url.clone())))
                .await
        }
        .boxed()
    }
}
