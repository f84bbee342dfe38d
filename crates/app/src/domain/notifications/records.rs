//! Notification Records

use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use jiff::Timestamp;
use serde_json::Value;
use zeroize::Zeroize;

use crate::{
    domain::{
        notifications::events::{EventKind, UnknownEvent, WILDCARD_EVENT},
        orders::records::OrderUuid,
        tenants::records::TenantUuid,
    },
    uuids::TypedUuid,
};

/// Subscription UUID
pub type SubscriptionUuid = TypedUuid<WebhookSubscription>;

/// Delivery Log UUID
pub type DeliveryLogUuid = TypedUuid<DeliveryLog>;

/// Key used to sign webhook bodies.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningSecret(String);

impl SigningSecret {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(**redacted**)")
    }
}

impl Drop for SigningSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Webhook Subscription Record
#[derive(Debug, Clone)]
pub struct WebhookSubscription {
    pub uuid: SubscriptionUuid,
    pub tenant: TenantUuid,
    pub url: String,
    /// Event names, or [`WILDCARD_EVENT`].
    pub events: Vec<String>,
    pub secret: Option<SigningSecret>,
    /// Manual retries allowed after the first attempt.
    pub max_retries: u32,
    pub timeout: Duration,
    pub headers: BTreeMap<String, String>,
    pub active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WebhookSubscription {
    /// Whether the subscription wants events named `event`.
    #[must_use]
    pub fn wants(&self, event: &str) -> bool {
        self.events
            .iter()
            .any(|subscribed| subscribed == WILDCARD_EVENT || subscribed == event)
    }
}

/// New Subscription Data
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub uuid: SubscriptionUuid,
    pub tenant: TenantUuid,
    pub url: String,
    pub events: Vec<String>,
    pub secret: Option<SigningSecret>,
    pub max_retries: u32,
    /// Defaults to the configured webhook timeout.
    pub timeout: Option<Duration>,
    pub headers: BTreeMap<String, String>,
}

/// Replacement values for a subscription's settings.
#[derive(Debug, Clone)]
pub struct SubscriptionUpdate {
    pub url: String,
    pub events: Vec<String>,
    pub secret: Option<SigningSecret>,
    pub max_retries: u32,
    pub timeout: Duration,
    pub headers: BTreeMap<String, String>,
    pub active: bool,
}

/// Check an event name is the wildcard or a known event.
///
/// # Errors
///
/// Returns [`UnknownEvent`] for any other name.
pub fn validate_event_name(name: &str) -> Result<(), UnknownEvent> {
    if name == WILDCARD_EVENT {
        return Ok(());
    }

    EventKind::from_str(name).map(|_| ())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Pending,
    Success,
    Failed,
}

impl DeliveryOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryOutcome {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown delivery outcome {other:?}")),
        }
    }
}

/// One delivery attempt of one event to one subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryLog {
    pub uuid: DeliveryLogUuid,
    pub tenant: TenantUuid,
    pub subscription: SubscriptionUuid,
    pub event: String,
    pub order: Option<OrderUuid>,
    /// The envelope that was sent.
    pub payload: Value,
    pub outcome: DeliveryOutcome,
    pub response_code: Option<u16>,
    /// Truncated response body.
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub attempt: u32,
    /// The attempt this one retried.
    pub retry_of: Option<DeliveryLogUuid>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// New Delivery Log Data, written before the call is made.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeliveryLog {
    pub uuid: DeliveryLogUuid,
    pub tenant: TenantUuid,
    pub subscription: SubscriptionUuid,
    pub event: String,
    pub order: Option<OrderUuid>,
    pub payload: Value,
    pub attempt: u32,
    pub retry_of: Option<DeliveryLogUuid>,
}

/// What happened when a delivery was attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub succeeded: bool,
    pub response_code: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
}

impl DeliveryResult {
    #[must_use]
    pub const fn outcome(&self) -> DeliveryOutcome {
        if self.succeeded {
            DeliveryOutcome::Success
        } else {
            DeliveryOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(events: &[&str]) -> WebhookSubscription {
        WebhookSubscription {
            uuid: SubscriptionUuid::new(),
            tenant: TenantUuid::new(),
            url: "https://hooks.example.com/waybill".to_string(),
            events: events.iter().map(ToString::to_string).collect(),
            secret: None,
            max_retries: 3,
            timeout: Duration::from_secs(30),
            headers: BTreeMap::new(),
            active: true,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        }
    }

    #[test]
    fn wildcard_matches_every_event() {
        let subscription = subscription(&["*"]);

        assert!(EventKind::ALL.iter().all(|kind| subscription.wants(kind.as_str())));
    }

    #[test]
    fn named_events_match_exactly() {
        let subscription = subscription(&["order.dispatched"]);

        assert!(subscription.wants("order.dispatched"));
        assert!(!subscription.wants("order.status_changed"));
    }

    #[test]
    fn event_names_are_validated() {
        assert!(validate_event_name("*").is_ok());
        assert!(validate_event_name("order.failed").is_ok());
        assert!(validate_event_name("order.shipped").is_err());
    }

    #[test]
    fn signing_secret_debug_is_redacted() {
        let secret = SigningSecret::new("whsec_123");

        assert!(!format!("{secret:?}").contains("whsec_123"));
    }
}
