//! Credential errors.

use thiserror::Error;

use crate::domain::{credentials::records::CredentialKey, errors::RepositoryError};

#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credential is registered for the key. Indicates tenant
    /// misconfiguration and is never retryable.
    #[error("no courier credential registered for {0}")]
    NotFound(CredentialKey),

    #[error("invalid credential: {0}")]
    Invalid(&'static str),

    #[error("credential storage error")]
    Repository(#[from] RepositoryError),
}
