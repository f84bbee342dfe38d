//! Notification Repositories

mod delivery_logs;
mod subscriptions;

pub use delivery_logs::{DeliveryLogsRepository, MockDeliveryLogsRepository, PgDeliveryLogsRepository};
pub use subscriptions::{
    MockSubscriptionsRepository, PgSubscriptionsRepository, SubscriptionsRepository,
};
