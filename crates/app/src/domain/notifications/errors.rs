//! Notification Errors

use thiserror::Error;

use crate::domain::errors::RepositoryError;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("delivery log not found")]
    LogNotFound,

    #[error("webhook subscription not found")]
    SubscriptionNotFound,

    #[error("delivery already succeeded")]
    AlreadySucceeded,

    #[error("delivery is still in progress")]
    StillPending,

    #[error("delivery reached attempt {attempt}; subscription allows {max_retries} retries")]
    RetryLimitReached { attempt: u32, max_retries: u32 },

    #[error("delivery attempt was already retried")]
    RetryConflict,

    #[error("webhook subscription is inactive")]
    SubscriptionInactive,

    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error("webhook payload could not be serialized")]
    Serialization(#[from] serde_json::Error),

    #[error("webhook payload could not be signed: {0}")]
    Signing(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
