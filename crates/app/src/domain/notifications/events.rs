//! Order lifecycle events.

use std::{fmt, str::FromStr};

use mockall::automock;
use serde_json::{Value, json};
use thiserror::Error;

use crate::domain::{
    orders::records::{Order, OrderStatus, OrderUuid},
    tenants::records::TenantUuid,
};

/// Subscription event name matching every event.
pub const WILDCARD_EVENT: &str = "*";

/// Kinds of event delivered to webhook subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Dispatched,
    Failed,
    StatusChanged,
}

impl EventKind {
    pub const ALL: [Self; 3] = [Self::Dispatched, Self::Failed, Self::StatusChanged];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dispatched => "order.dispatched",
            Self::Failed => "order.failed",
            Self::StatusChanged => "order.status_changed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown event {0:?}")]
pub struct UnknownEvent(pub String);

impl FromStr for EventKind {
    type Err = UnknownEvent;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownEvent(value.to_string()))
    }
}

/// An event to fan out to a tenant's subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    pub kind: EventKind,
    pub tenant: TenantUuid,
    pub order: Option<OrderUuid>,
    pub data: Value,
}

impl OrderEvent {
    /// Event carrying a snapshot of the order.
    #[must_use]
    pub fn for_order(kind: EventKind, order: &Order) -> Self {
        Self {
            kind,
            tenant: order.tenant,
            order: Some(order.uuid),
            data: json!({ "order": order.snapshot() }),
        }
    }

    /// `order.status_changed` for a transition out of `previous`.
    #[must_use]
    pub fn status_changed(order: &Order, previous: OrderStatus) -> Self {
        Self {
            kind: EventKind::StatusChanged,
            tenant: order.tenant,
            order: Some(order.uuid),
            data: json!({
                "order": order.snapshot(),
                "previousStatus": previous,
            }),
        }
    }
}

/// Sink for order events. Publishing never blocks or fails the caller.
#[automock]
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: OrderEvent);
}
