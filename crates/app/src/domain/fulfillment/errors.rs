//! Fulfillment Errors

use thiserror::Error;

use crate::domain::{
    carrier::CarrierError,
    credentials::CredentialError,
    errors::RepositoryError,
    orders::records::{MAX_RETRIES, OrderStatus},
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("order not found")]
    NotFound,

    #[error("order has already been dispatched")]
    AlreadyDispatched,

    #[error("order has used all {MAX_RETRIES} dispatch attempts")]
    MaxRetriesExceeded,

    #[error("order has permanently failed and must be requeued first")]
    PermanentlyFailed,

    #[error("order has not been dispatched")]
    NotDispatched,

    #[error("order in status {0} cannot be requeued")]
    NotRequeueable(OrderStatus),

    /// The order changed underneath the operation.
    #[error("order was modified concurrently")]
    Conflict,

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Carrier(#[from] CarrierError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
