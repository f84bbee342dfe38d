//! Fulfillment

pub mod errors;
mod service;

pub use errors::DispatchError;
pub use service::{
    CourierFulfillmentService, DispatchSweep, FulfillmentService, MockFulfillmentService,
};
