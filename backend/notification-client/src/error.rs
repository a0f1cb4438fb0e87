use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("http request failed: {0}")]
    Http(String),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// Access token rejected and could not be refreshed; the user must log in again
    #[error("session expired")]
    SessionExpired,

    #[error("push transport error: {0}")]
    Transport(String),

    #[error("push handshake failed: {0}")]
    Handshake(String),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("connection manager already torn down")]
    TornDown,
}

impl AppError {
    /// Errors a reconnect loop may recover from by simply trying again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_)
                | Self::Transport(_)
                | Self::Handshake(_)
                | Self::Broker(_)
                | Self::Timeout(_)
        ) || matches!(self, Self::Status { status, .. } if *status >= 500)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AppError::Decode(e.to_string())
        } else if e.is_timeout() {
            AppError::Timeout(e.to_string())
        } else {
            AppError::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Decode(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Transport(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}
