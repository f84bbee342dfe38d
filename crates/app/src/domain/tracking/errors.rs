//! Tracking Errors

use thiserror::Error;

use crate::domain::errors::RepositoryError;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("refresh of {requested} orders exceeds the limit of {max}")]
    BatchTooLarge { requested: usize, max: usize },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
