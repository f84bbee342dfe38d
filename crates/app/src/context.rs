//! App Context

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;

use crate::{
    cache::{DEFAULT_CACHE_CAPACITY, KeyedCache},
    domain::{
        carrier::{CarrierSettings, HttpCarrierGateway},
        credentials::{CredentialResolver, PgCredentialsRepository},
        fulfillment::{CourierFulfillmentService, FulfillmentService},
        notifications::{
            HttpWebhookTransport, NotificationSettings, NotificationsService,
            PgDeliveryLogsRepository, PgSubscriptionsRepository, SubscriptionsService,
        },
        orders::PgOrdersRepository,
        tracking::{BulkTrackingPoller, TrackingService, TrackingSettings},
    },
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to build carrier client")]
    Carrier(#[source] reqwest::Error),
}

/// Tunables for every service in the context.
#[derive(Debug, Clone, Default)]
pub struct AppSettings {
    pub carrier: CarrierSettings,
    pub tracking: TrackingSettings,
    pub notifications: NotificationSettings,
}

#[derive(Clone)]
pub struct AppContext {
    pub credentials: CredentialResolver,
    pub fulfillment: Arc<dyn FulfillmentService>,
    pub tracking: Arc<dyn TrackingService>,
    pub subscriptions: SubscriptionsService,
    pub notifications: NotificationsService,
}

impl AppContext {
    /// Wire the Postgres-backed services over `pool`.
    ///
    /// # Errors
    ///
    /// Returns an error when the carrier HTTP client cannot be built.
    pub fn new(pool: PgPool, settings: AppSettings) -> Result<Self, AppInitError> {
        let orders = Arc::new(PgOrdersRepository::new(pool.clone()));

        let credentials = CredentialResolver::with_cache(
            Arc::new(PgCredentialsRepository::new(pool.clone())),
            Arc::new(KeyedCache::new("credentials", DEFAULT_CACHE_CAPACITY)),
        );

        let carrier = Arc::new(
            HttpCarrierGateway::new(settings.carrier).map_err(AppInitError::Carrier)?,
        );

        let subscriptions = SubscriptionsService::new(
            Arc::new(PgSubscriptionsRepository::new(pool.clone())),
            &settings.notifications,
        );

        let notifications = NotificationsService::new(
            subscriptions.clone(),
            Arc::new(PgDeliveryLogsRepository::new(pool)),
            Arc::new(HttpWebhookTransport::new(&settings.notifications)),
        );

        let publisher = Arc::new(notifications.clone());

        Ok(Self {
            fulfillment: Arc::new(CourierFulfillmentService::new(
                orders.clone(),
                credentials.clone(),
                carrier.clone(),
                publisher.clone(),
            )),
            tracking: Arc::new(BulkTrackingPoller::new(
                orders,
                credentials.clone(),
                carrier,
                publisher,
                settings.tracking,
            )),
            credentials,
            subscriptions,
            notifications,
        })
    }
}
