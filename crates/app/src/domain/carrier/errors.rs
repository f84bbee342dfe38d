//! Carrier Errors

use thiserror::Error;

/// Classified failure of a carrier call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CarrierError {
    /// The carrier rejected the credential (401/403).
    #[error("carrier rejected the credential: {0}")]
    Auth(String),

    /// The carrier rejected the request itself.
    #[error("carrier rejected the request: {0}")]
    Validation(String),

    /// Outage, timeout or unreadable response.
    #[error("carrier call failed: {0}")]
    Transient(String),
}

impl CarrierError {
    /// Whether repeating the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for CarrierError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Transient("request timed out".to_string())
        } else if error.is_decode() {
            Self::Transient(format!("malformed response body: {error}"))
        } else {
            Self::Transient(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(CarrierError::Transient("503".into()).is_retryable());
        assert!(!CarrierError::Auth("401".into()).is_retryable());
        assert!(!CarrierError::Validation("bad pin".into()).is_retryable());
    }
}
