//! Carrier Gateway

use async_trait::async_trait;
use mockall::automock;

use crate::domain::{
    carrier::errors::CarrierError,
    credentials::records::CourierCredential,
    orders::records::{Order, TrackingId},
};

/// Latest carrier-reported state of one shipment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedShipment {
    pub tracking_id: TrackingId,
    /// Raw carrier status string.
    pub carrier_status: String,
}

/// Courier API operations. Implementations never touch storage.
#[automock]
#[async_trait]
pub trait CarrierGateway: Send + Sync {
    /// Create a shipment for the order and return the issued tracking id.
    async fn create_shipment(
        &self,
        credential: &CourierCredential,
        order: &Order,
    ) -> Result<TrackingId, CarrierError>;

    /// Push the order's current shipment details to an existing shipment.
    async fn edit_shipment(
        &self,
        credential: &CourierCredential,
        order: &Order,
        tracking_id: &TrackingId,
    ) -> Result<(), CarrierError>;

    /// Fetch the current status of every tracking id in one call.
    ///
    /// Ids the carrier does not know are absent from the result.
    async fn track(
        &self,
        credential: &CourierCredential,
        tracking_ids: &[TrackingId],
    ) -> Result<Vec<TrackedShipment>, CarrierError>;
}
