//! Order Records

use std::{fmt, str::FromStr};

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    domain::{credentials::records::CredentialKey, tenants::records::TenantUuid},
    uuids::TypedUuid,
};

/// Maximum number of dispatch attempts charged to one order.
pub const MAX_RETRIES: u32 = 3;

/// How long a charged attempt keeps every other caller from charging the
/// same order. Longer than any carrier call.
pub const ATTEMPT_CLAIM_TTL: SignedDuration = SignedDuration::from_mins(5);

/// Claims taken before the returned instant have lapsed at `at`.
#[must_use]
pub fn claim_expiry(at: Timestamp) -> Timestamp {
    at.checked_sub(ATTEMPT_CLAIM_TTL).unwrap_or(Timestamp::MIN)
}

/// Order UUID
pub type OrderUuid = TypedUuid<Order>;

/// Authoritative lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    DispatchRequested,
    Dispatched,
    InTransit,
    Delivered,
    Returned,
    FailedPermanent,
}

impl OrderStatus {
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::DispatchRequested,
        Self::Dispatched,
        Self::InTransit,
        Self::Delivered,
        Self::Returned,
        Self::FailedPermanent,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::DispatchRequested => "dispatch_requested",
            Self::Dispatched => "dispatched",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Returned => "returned",
            Self::FailedPermanent => "failed_permanent",
        }
    }

    /// Human-readable label derived from the status.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::DispatchRequested => "Awaiting dispatch",
            Self::Dispatched => "Dispatched",
            Self::InTransit => "In transit",
            Self::Delivered => "Delivered",
            Self::Returned => "Returned",
            Self::FailedPermanent => "Failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Returned | Self::FailedPermanent)
    }

    /// Position in the shipment lifecycle. Tracking updates only ever move
    /// an order to a strictly higher rank.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::DispatchRequested => 1,
            Self::Dispatched => 2,
            Self::InTransit => 3,
            Self::Delivered | Self::Returned | Self::FailedPermanent => 4,
        }
    }

    /// Statuses a tracking observation of `self` may replace.
    #[must_use]
    pub fn advances_from(self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|status| !status.is_terminal() && status.rank() < self.rank())
            .collect()
    }

    /// Whether a tracking observation of `self` replaces `current`.
    #[must_use]
    pub const fn advances(self, current: Self) -> bool {
        !current.is_terminal() && current.rank() < self.rank()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown order status {0:?}")]
pub struct UnknownOrderStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownOrderStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| UnknownOrderStatus(value.to_string()))
    }
}

/// Carrier-assigned waybill number. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingId(String);

impl TrackingId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Prepaid,
    CashOnDelivery,
}

/// Consignee and parcel details sent to the carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentDetails {
    pub consignee_name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub product_description: String,
    pub weight_grams: u32,
    /// Declared value in minor currency units.
    pub declared_value: u64,
    pub payment_mode: PaymentMode,
    /// Amount to collect on delivery, in minor currency units.
    pub cod_amount: Option<u64>,
}

/// Order Record
#[derive(Debug, Clone)]
pub struct Order {
    pub uuid: OrderUuid,
    pub tenant: TenantUuid,
    /// Tenant-facing order number, sent to the carrier as the shipment reference.
    pub reference: String,
    pub pickup_location: String,
    pub carrier: String,
    pub shipment: ShipmentDetails,
    pub tracking_id: Option<TrackingId>,
    pub status: OrderStatus,
    /// Last raw status string reported by the carrier.
    pub carrier_status: Option<String>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<Timestamp>,
    pub tracked_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Order {
    #[must_use]
    pub fn credential_key(&self) -> CredentialKey {
        CredentialKey::new(self.tenant, &self.pickup_location)
    }

    #[must_use]
    pub const fn retries_exhausted(&self) -> bool {
        self.retry_count >= MAX_RETRIES
    }

    /// Event payload describing the order's current state.
    #[must_use]
    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            uuid: self.uuid,
            reference: self.reference.clone(),
            carrier: self.carrier.clone(),
            tracking_id: self.tracking_id.clone(),
            status: self.status,
            status_label: self.status.label(),
            carrier_status: self.carrier_status.clone(),
            retry_count: self.retry_count,
            last_error: self.last_error.clone(),
        }
    }
}

/// Serializable view of an order used as webhook event data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSnapshot {
    pub uuid: OrderUuid,
    pub reference: String,
    pub carrier: String,
    pub tracking_id: Option<TrackingId>,
    pub status: OrderStatus,
    pub status_label: &'static str,
    pub carrier_status: Option<String>,
    pub retry_count: u32,
    pub last_error: Option<String>,
}
