//! Order Data

use jiff::Timestamp;

use crate::domain::{
    orders::records::{OrderStatus, OrderUuid, ShipmentDetails, TrackingId},
    tenants::records::TenantUuid,
};

/// New Order Data
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub uuid: OrderUuid,
    pub tenant: TenantUuid,
    pub reference: String,
    pub pickup_location: String,
    pub carrier: String,
    pub shipment: ShipmentDetails,
}

/// Result of a failed dispatch attempt, written after the carrier call.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub error: String,
    /// The failure cannot be fixed by retrying.
    pub permanent: bool,
}

/// Carrier status observed for a tracking id.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingObservation {
    pub tracking_id: TrackingId,
    /// Internal status the carrier status maps to.
    pub status: OrderStatus,
    /// Raw carrier status string.
    pub carrier_status: String,
    pub observed_at: Timestamp,
}

/// Status before and after a write, read within that write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub order: OrderUuid,
    pub tenant: TenantUuid,
    pub previous: OrderStatus,
    pub current: OrderStatus,
}

impl StatusChange {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}
