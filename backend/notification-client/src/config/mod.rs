use crate::error::{AppError, Result};
use std::env;
use std::time::Duration;
use url::Url;

/// Destination every authenticated user receives their own notifications on
pub const DEFAULT_PUSH_TOPIC: &str = "/user/queue/notifications";

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub push: PushConfig,
    pub auth: AuthConfig,
    pub inbox: InboxConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Backend origin, e.g. `http://localhost:8080/api`
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    /// WebSocket endpoint speaking STOMP
    pub url: String,
    pub topic: String,
    pub reconnect_delay: Duration,
    pub handshake_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InboxConfig {
    pub capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let base_url = env::var("API_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080/api".to_string())
            .trim_end_matches('/')
            .to_string();

        let push_url = match env::var("PUSH_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => derive_push_url(&base_url)?,
        };

        let config = Config {
            api: ApiConfig { base_url },
            push: PushConfig {
                url: push_url,
                topic: env::var("PUSH_TOPIC").unwrap_or_else(|_| DEFAULT_PUSH_TOPIC.to_string()),
                reconnect_delay: Duration::from_millis(parse_var("RECONNECT_DELAY_MS", 5000)?),
                handshake_timeout: Duration::from_millis(parse_var(
                    "HANDSHAKE_TIMEOUT_MS",
                    10_000,
                )?),
            },
            auth: AuthConfig {
                access_token: non_empty_var("ACCESS_TOKEN"),
                refresh_token: non_empty_var("REFRESH_TOKEN"),
            },
            inbox: InboxConfig {
                capacity: parse_var("INBOX_CAPACITY", 200)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.push.reconnect_delay.is_zero() {
            return Err(AppError::Config(
                "RECONNECT_DELAY_MS must be greater than zero".into(),
            ));
        }
        if !self.push.topic.starts_with('/') {
            return Err(AppError::Config(format!(
                "PUSH_TOPIC must be an absolute destination, got {}",
                self.push.topic
            )));
        }
        if self.inbox.capacity == 0 {
            return Err(AppError::Config("INBOX_CAPACITY must be at least 1".into()));
        }
        Url::parse(&self.api.base_url)
            .map_err(|e| AppError::Config(format!("invalid API_BASE_URL: {}", e)))?;
        Ok(())
    }
}

/// `http(s)://host/api` -> `ws(s)://host/api/ws`
pub fn derive_push_url(base_url: &str) -> Result<String> {
    let mut url = Url::parse(&format!("{}/ws", base_url.trim_end_matches('/')))
        .map_err(|e| AppError::Config(format!("invalid API_BASE_URL: {}", e)))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(AppError::Config(format!(
                "unsupported API_BASE_URL scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| AppError::Config(format!("cannot derive push URL from {}", base_url)))?;

    Ok(url.to_string())
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{} is invalid: {}", key, e))),
        Err(_) => Ok(default),
    }
}
