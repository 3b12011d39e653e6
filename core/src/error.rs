//! Error types for the cat API client.
//!
//! # Design
//! `NotFound` gets a dedicated variant because the presentation layer shows a
//! specific notice when no cat matches a tag. It carries the status so the
//! "404" indicator is data, not something recovered by searching a message.
//! All other non-2xx responses land in `Http` with the raw status code and
//! body for debugging.

use thiserror::Error;

/// Errors produced by the cat service, its parsers, and image probing.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The server returned 404: no cat matches the requested tag or id.
    #[error("HTTP {status}: not found {body}")]
    NotFound { status: u16, body: String },

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never produced a response (connect, TLS, body read).
    #[error("transport failed: {0}")]
    Transport(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The downloaded bytes are not a readable image.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// The configured base URL cannot carry endpoint paths.
    #[error("invalid base url: {0}")]
    InvalidUrl(String),

    /// A one-shot stream was awaited after it had already yielded its item.
    #[error("one-shot stream already yielded its item")]
    Exhausted,
}

impl ApiError {
    /// HTTP status attached to the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound { status, .. } | ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}
