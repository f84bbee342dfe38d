//! Notifications
//!
//! Order events fan out to every active webhook subscription of the
//! tenant that wants them. Each attempt is written to the delivery log
//! before the call and completed once afterwards; failed deliveries are
//! only re-sent on request.

pub mod envelope;
pub mod errors;
pub mod events;
pub mod records;
mod repositories;
mod service;
mod subscriptions;
pub mod transport;

pub use errors::NotificationError;
pub use repositories::{
    DeliveryLogsRepository, MockDeliveryLogsRepository, MockSubscriptionsRepository,
    PgDeliveryLogsRepository, PgSubscriptionsRepository, SubscriptionsRepository,
};
pub use service::NotificationsService;
pub use subscriptions::SubscriptionsService;
pub use transport::{HttpWebhookTransport, NotificationSettings, WebhookTransport};
