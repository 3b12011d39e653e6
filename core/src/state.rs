//! Observable application state.

use crate::error::ApiError;
use crate::types::{ImagePayload, TagList};

pub const NOT_FOUND_NOTICE: &str = "No cats could be found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Http,
    Transport,
    Deserialization,
    Decode,
    Exhausted,
}

/// The last failure seen by the controller, kept structured so observers
/// can branch on the kind instead of parsing the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorStatus {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ErrorStatus {
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Short user-facing notice, if this error warrants one.
    pub fn notice(&self) -> Option<&'static str> {
        self.is_not_found().then_some(NOT_FOUND_NOTICE)
    }
}

impl From<&ApiError> for ErrorStatus {
    fn from(err: &ApiError) -> Self {
        let kind = match err {
            ApiError::NotFound { .. } => ErrorKind::NotFound,
            ApiError::Http { .. } => ErrorKind::Http,
            ApiError::Transport(_) | ApiError::InvalidUrl(_) => ErrorKind::Transport,
            ApiError::Deserialization(_) => ErrorKind::Deserialization,
            ApiError::Decode(_) => ErrorKind::Decode,
            ApiError::Exhausted => ErrorKind::Exhausted,
        };
        Self {
            kind,
            status: err.status(),
            message: err.to_string(),
        }
    }
}

/// Point-in-time copy of everything the controller publishes.
///
/// `revision` counts applied updates, so a polling observer can tell
/// whether anything changed since its last look.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    pub image: Option<ImagePayload>,
    pub tags: Option<TagList>,
    pub last_error: Option<ErrorStatus>,
    pub revision: u64,
}
