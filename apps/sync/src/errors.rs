use thiserror::Error;

/// Error taxonomy for calls against the remote profile store.
///
/// Classification rules:
/// - 401 → `Unauthorized` (top level invalidates the session)
/// - 404/405 → `Unsupported` (tolerated as "already gone" on delete,
///   triggers the PATCH fallback on update)
/// - other 4xx → `Validation` with the message body
/// - 5xx → `Server`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Endpoint not supported (status {status})")]
    Unsupported { status: u16 },

    #[error("Validation error (status {status}): {message}")]
    Validation { status: u16, message: String },

    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ApiError {
    /// Classifies a non-success HTTP response from its status code and body.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => ApiError::Unauthorized,
            404 | 405 => ApiError::Unsupported { status },
            400..=499 => ApiError::Validation {
                status,
                message: extract_message(body),
            },
            _ => ApiError::Server {
                status,
                message: extract_message(body),
            },
        }
    }

    /// A delete that hit a missing record or endpoint counts as converged.
    pub fn is_already_gone(&self) -> bool {
        matches!(self, ApiError::Unsupported { .. })
    }
}

/// Pulls a human-readable message out of an error body.
/// Accepts `{"error": {"message": ...}}` and `{"message": ...}` envelopes;
/// falls back to the raw body.
fn extract_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let nested = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str());
        let flat = value.get("message").and_then(|m| m.as_str());
        if let Some(msg) = nested.or(flat) {
            return msg.to_string();
        }
    }
    let body = body.trim();
    if body.is_empty() {
        "Unknown error".to_string()
    } else {
        body.to_string()
    }
}
