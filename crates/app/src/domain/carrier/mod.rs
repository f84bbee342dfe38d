//! Carrier gateway: the courier API adapter.
//!
//! One operation per courier verb. Responses are classified into
//! [`CarrierError`] variants so callers can tell a retryable outage from a
//! request the carrier will never accept.

pub mod errors;
mod gateway;
mod http;
mod wire;

pub use errors::CarrierError;
pub use gateway::{CarrierGateway, MockCarrierGateway, TrackedShipment};
pub use http::{CarrierSettings, DEFAULT_CARRIER_TIMEOUT, HttpCarrierGateway};
