//! Waybill Domain Concerns

pub mod carrier;
pub mod credentials;
pub mod errors;
pub mod fulfillment;
pub mod notifications;
pub mod orders;
pub mod tenants;
pub mod tracking;
