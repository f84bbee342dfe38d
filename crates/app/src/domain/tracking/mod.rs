//! Bulk Tracking

pub mod errors;
pub mod report;
mod service;
pub mod status;

pub use errors::TrackingError;
pub use service::{BulkTrackingPoller, MockTrackingService, TrackingService, TrackingSettings};
