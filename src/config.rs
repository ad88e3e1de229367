use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Runtime configuration, read from `CHESS_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_address: String,
    pub backend_url: String,
    pub backend_token: String,
    pub request_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub clock_seconds: u32,
    pub log_level: String,
    pub verify_backend_on_startup: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("missing required setting {0}")]
    Missing(&'static str),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            backend_url: String::new(),
            backend_token: String::new(),
            request_timeout_ms: 5000,
            retry_attempts: 3,
            retry_delay_ms: 500,
            clock_seconds: 300,
            log_level: "info".to_string(),
            verify_backend_on_startup: true,
        }
    }
}

impl Config {
    pub const ENV_PREFIX: &'static str = "CHESS_";

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default())).merge(Env::prefixed(Self::ENV_PREFIX))
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Config = figment.extract().map_err(Box::new)?;
        if config.backend_url.trim().is_empty() {
            return Err(ConfigError::Missing("CHESS_BACKEND_URL"));
        }
        if config.backend_token.trim().is_empty() {
            return Err(ConfigError::Missing("CHESS_BACKEND_TOKEN"));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    #[test]
    fn defaults_are_applied() {
        let config = Config::from_figment(
            base()
                .merge(("backend_url", "http://localhost:9000"))
                .merge(("backend_token", "secret")),
        )
        .unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay_ms, 500);
        assert_eq!(config.clock_seconds, 300);
        assert!(config.verify_backend_on_startup);
    }

    #[test]
    fn backend_url_is_required() {
        let err = Config::from_figment(base().merge(("backend_token", "secret"))).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("CHESS_BACKEND_URL")));
    }

    #[test]
    fn backend_token_is_required() {
        let err =
            Config::from_figment(base().merge(("backend_url", "http://localhost:9000"))).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("CHESS_BACKEND_TOKEN")));
    }

    #[test]
    fn overrides_win_over_defaults() {
        let config = Config::from_figment(
            base()
                .merge(("backend_url", "http://localhost:9000"))
                .merge(("backend_token", "secret"))
                .merge(("clock_seconds", 60))
                .merge(("verify_backend_on_startup", false)),
        )
        .unwrap();

        assert_eq!(config.clock_seconds, 60);
        assert!(!config.verify_backend_on_startup);
    }
}
