use reqwest::StatusCode;
use thiserror::Error;

pub use anyhow::Context;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("request failed with status {0}")]
    Status(StatusCode),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn message<T: Into<String>>(msg: T) -> Self {
        AppError::Message(msg.into())
    }

    /// Upstream failures worth retrying: rate limiting and temporary
    /// unavailability. Everything else is terminal for the current attempt.
    pub fn is_transient(&self) -> bool {
        let status = match self {
            AppError::Status(code) => Some(*code),
            AppError::Reqwest(err) => err.status(),
            _ => None,
        };
        matches!(
            status,
            Some(StatusCode::TOO_MANY_REQUESTS) | Some(StatusCode::SERVICE_UNAVAILABLE)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}
