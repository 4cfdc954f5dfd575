use thiserror::Error;

use crate::config::ConfigError;

/// Which of the three user-facing failure messages an error maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTier {
    Client,
    Server,
    Unexpected,
}

impl ErrorTier {
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorTier::Client => "Oops something went wrong (client error)!",
            ErrorTier::Server => "Oops something went wrong (server error)",
            ErrorTier::Unexpected => "Oops something went wrong (unexpected error)!",
        }
    }
}

#[derive(Debug, Error)]
pub enum OctoshopError {
    /// The inference service rejected the request (4xx).
    #[error("client error ({status}): {body}")]
    Client {
        status: reqwest::StatusCode,
        body: String,
    },
    /// The inference service failed on its side (5xx or a failed job).
    #[error("server error ({status}): {body}")]
    Server {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl OctoshopError {
    /// Builds the tiered error for a non-success HTTP status.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status.is_server_error() {
            OctoshopError::Server { status, body }
        } else {
            OctoshopError::Client { status, body }
        }
    }

    pub fn tier(&self) -> ErrorTier {
        match self {
            OctoshopError::Client { .. } => ErrorTier::Client,
            OctoshopError::Server { .. } => ErrorTier::Server,
            _ => ErrorTier::Unexpected,
        }
    }
}

pub type Result<T> = std::result::Result<T, OctoshopError>;
