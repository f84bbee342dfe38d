//! Webhook subscription management.

use std::{sync::Arc, time::Duration};

use tracing::{info, instrument};
use url::Url;

use crate::{
    cache::{DEFAULT_CACHE_CAPACITY, KeyedCache},
    domain::{
        notifications::{
            errors::NotificationError,
            records::{
                NewSubscription, SubscriptionUpdate, SubscriptionUuid, WebhookSubscription,
                validate_event_name,
            },
            repositories::SubscriptionsRepository,
            transport::NotificationSettings,
        },
        tenants::records::TenantUuid,
    },
};

type ActiveSubscriptions = Arc<Vec<WebhookSubscription>>;

/// Creates and looks up webhook subscriptions, caching each tenant's
/// active set until one of its subscriptions is written.
#[derive(Clone)]
pub struct SubscriptionsService {
    repository: Arc<dyn SubscriptionsRepository>,
    cache: Arc<KeyedCache<TenantUuid, ActiveSubscriptions>>,
    default_timeout: Duration,
}

impl SubscriptionsService {
    #[must_use]
    pub fn new(
        repository: Arc<dyn SubscriptionsRepository>,
        settings: &NotificationSettings,
    ) -> Self {
        Self {
            repository,
            cache: Arc::new(KeyedCache::new("subscriptions", DEFAULT_CACHE_CAPACITY)),
            default_timeout: settings.default_timeout,
        }
    }

    /// Register a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError::InvalidSubscription`] for a non-HTTP URL,
    /// an empty or unknown event list or a zero timeout.
    #[instrument(skip_all, fields(tenant = %subscription.tenant))]
    pub async fn create(
        &self,
        mut subscription: NewSubscription,
    ) -> Result<WebhookSubscription, NotificationError> {
        let timeout = subscription.timeout.unwrap_or(self.default_timeout);

        validate(&subscription.url, &subscription.events, timeout)?;

        subscription.timeout = Some(timeout);

        let tenant = subscription.tenant;
        let created = self.repository.create_subscription(subscription).await;

        self.cache.invalidate(&tenant).await;

        let created = created?;

        info!(subscription = %created.uuid, "webhook subscription created");

        Ok(created)
    }

    /// Replace a subscription's settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or the subscription does
    /// not belong to the tenant.
    #[instrument(skip(self, update), fields(%tenant, %subscription))]
    pub async fn update(
        &self,
        tenant: TenantUuid,
        subscription: SubscriptionUuid,
        update: SubscriptionUpdate,
    ) -> Result<WebhookSubscription, NotificationError> {
        validate(&update.url, &update.events, update.timeout)?;

        let updated = self
            .repository
            .update_subscription(tenant, subscription, update)
            .await;

        self.cache.invalidate(&tenant).await;

        updated?.ok_or(NotificationError::SubscriptionNotFound)
    }

    /// Stop deliveries to a subscription while keeping its history.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription does not belong to the tenant.
    #[instrument(skip(self))]
    pub async fn deactivate(
        &self,
        tenant: TenantUuid,
        subscription: SubscriptionUuid,
    ) -> Result<WebhookSubscription, NotificationError> {
        let updated = self.repository.set_active(tenant, subscription, false).await;

        self.cache.invalidate(&tenant).await;

        let updated = updated?.ok_or(NotificationError::SubscriptionNotFound)?;

        info!("webhook subscription deactivated");

        Ok(updated)
    }

    /// Delete a subscription and its delivery history.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription does not belong to the tenant.
    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        tenant: TenantUuid,
        subscription: SubscriptionUuid,
    ) -> Result<(), NotificationError> {
        let deleted = self
            .repository
            .delete_subscription(tenant, subscription)
            .await;

        self.cache.invalidate(&tenant).await;

        if deleted? {
            Ok(())
        } else {
            Err(NotificationError::SubscriptionNotFound)
        }
    }

    /// Fetch one subscription, active or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription does not belong to the tenant.
    pub async fn get(
        &self,
        tenant: TenantUuid,
        subscription: SubscriptionUuid,
    ) -> Result<WebhookSubscription, NotificationError> {
        self.repository
            .get_subscription(tenant, subscription)
            .await?
            .ok_or(NotificationError::SubscriptionNotFound)
    }

    /// The tenant's active subscriptions.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub async fn list_active(
        &self,
        tenant: TenantUuid,
    ) -> Result<ActiveSubscriptions, NotificationError> {
        if let Some(active) = self.cache.get(&tenant).await {
            return Ok(active);
        }

        let generation = self.cache.generation().await;
        let active = Arc::new(self.repository.list_active(tenant).await?);

        self.cache.insert(tenant, active.clone(), generation).await;

        Ok(active)
    }
}

fn validate(url: &str, events: &[String], timeout: Duration) -> Result<(), NotificationError> {
    let invalid = |reason: String| Err(NotificationError::InvalidSubscription(reason));

    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {}
        Ok(parsed) => return invalid(format!("unsupported url scheme {:?}", parsed.scheme())),
        Err(error) => return invalid(format!("invalid url: {error}")),
    }

    if events.is_empty() {
        return invalid("at least one event is required".to_string());
    }

    for event in events {
        if let Err(error) = validate_event_name(event) {
            return invalid(error.to_string());
        }
    }

    if timeout.is_zero() {
        return invalid("timeout must be positive".to_string());
    }

    Ok(())
}
