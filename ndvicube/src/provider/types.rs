//! Shared provider types

use thiserror::Error;

/// Errors from talking to a remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("authentication error: {0}")]
    AuthError(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Status and body of a completed HTTP exchange.
///
/// Non-success statuses are returned as responses, not errors, so callers
/// can tell "no data" apart from a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as lossy UTF-8, truncated for log and error messages.
    pub fn body_excerpt(&self) -> String {
        const MAX: usize = 300;
        let text = String::from_utf8_lossy(&self.body);
        if text.len() <= MAX {
            text.into_owned()
        } else {
            let mut end = MAX;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &text[..end])
        }
    }
}
