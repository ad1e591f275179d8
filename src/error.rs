#![forbid(unsafe_code)]

use thiserror::Error;

use crate::security::redact;

/// Failures surfaced by the query pipeline.
///
/// A lookup that finds nothing is not an error: it comes back as an empty
/// result list (or `exists: false` for direct lookups).
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no query provided")]
    InvalidInput,
    #[error("lookup failed: {0}")]
    LookupFailed(#[from] RemoteError),
}

/// Errors raised by a [`crate::lookup::ResourceApi`] implementation.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("credentials unavailable: {0}")]
    Credentials(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Converts a `ureq` failure, pulling the remote's own message out of the
    /// error body when there is one. `secrets` are scrubbed from the result
    /// because transport errors echo the request URL.
    pub(crate) fn from_ureq(err: ureq::Error, secrets: &[&str]) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let body = response.into_string().unwrap_or_default();
                let message = error_message(&body).unwrap_or_else(|| format!("HTTP {status}"));
                Self::Status {
                    status,
                    message: redact(&message, secrets),
                }
            }
            ureq::Error::Transport(transport) => {
                Self::Transport(redact(&transport.to_string(), secrets))
            }
        }
    }

    /// Returns `true` when the remote rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. } | Self::Credentials(_))
    }
}

// Google APIs answer `{"error": {"message": ..}}`, the OAuth endpoint
// `{"error": "..", "error_description": ".."}`.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(|message| message.as_str())
        .or_else(|| value.get("error_description").and_then(|d| d.as_str()))
        .or_else(|| error.as_str())
        .map(str::to_string)
}
