//! Notification fan-out.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use jiff::Timestamp;
use serde_json::Value;
use tokio::{runtime::Handle, task::JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    errors::RepositoryError,
    notifications::{
        envelope::{DELIVERY_HEADER, EVENT_HEADER, Envelope, SIGNATURE_HEADER, sign},
        errors::NotificationError,
        events::{EventPublisher, OrderEvent},
        records::{DeliveryLog, DeliveryLogUuid, DeliveryOutcome, NewDeliveryLog, WebhookSubscription},
        repositories::DeliveryLogsRepository,
        subscriptions::SubscriptionsService,
        transport::{WebhookRequest, WebhookTransport},
    },
    orders::records::OrderUuid,
    tenants::records::TenantUuid,
};

/// One attempt to deliver an envelope.
struct Attempt<'a> {
    event: &'a str,
    order: Option<OrderUuid>,
    payload: &'a Value,
    number: u32,
    retry_of: Option<DeliveryLogUuid>,
}

/// Delivers order events to webhook subscriptions and keeps their history.
#[derive(Clone)]
pub struct NotificationsService {
    subscriptions: SubscriptionsService,
    logs: Arc<dyn DeliveryLogsRepository>,
    transport: Arc<dyn WebhookTransport>,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl NotificationsService {
    #[must_use]
    pub fn new(
        subscriptions: SubscriptionsService,
        logs: Arc<dyn DeliveryLogsRepository>,
        transport: Arc<dyn WebhookTransport>,
    ) -> Self {
        Self {
            subscriptions,
            logs,
            transport,
            tasks: Arc::default(),
        }
    }

    /// Deliver an event to every matching active subscription at once.
    ///
    /// A failing subscription does not affect the others; each attempt is
    /// returned as its delivery log.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscriptions cannot be loaded or the event
    /// cannot be serialized.
    #[instrument(skip_all, fields(event = %event.kind, tenant = %event.tenant))]
    pub async fn deliver(&self, event: &OrderEvent) -> Result<Vec<DeliveryLog>, NotificationError> {
        let subscriptions = self.subscriptions.list_active(event.tenant).await?;

        let matching: Vec<&WebhookSubscription> = subscriptions
            .iter()
            .filter(|subscription| subscription.wants(event.kind.as_str()))
            .collect();

        if matching.is_empty() {
            debug!("no subscriptions for event");
            return Ok(Vec::new());
        }

        let payload = serde_json::to_value(Envelope::for_event(event, Timestamp::now()))?;

        let attempts = join_all(matching.into_iter().map(|subscription| {
            self.attempt(
                subscription,
                Attempt {
                    event: event.kind.as_str(),
                    order: event.order,
                    payload: &payload,
                    number: 1,
                    retry_of: None,
                },
            )
        }))
        .await;

        let mut logs = Vec::with_capacity(attempts.len());

        for attempt in attempts {
            match attempt {
                Ok(log) => logs.push(log),
                Err(error) => warn!(%error, "webhook delivery could not be attempted"),
            }
        }

        Ok(logs)
    }

    /// Re-send a failed delivery as a new attempt.
    ///
    /// `log` may be any attempt of the delivery; the checks apply to its
    /// newest attempt, and the new attempt follows on from it. Earlier logs
    /// are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError::AlreadySucceeded`] for a successful
    /// delivery, [`NotificationError::RetryLimitReached`] once the
    /// subscription's retries are used, or
    /// [`NotificationError::SubscriptionInactive`] when it has been disabled.
    /// [`NotificationError::RetryConflict`] means another retry of the same
    /// attempt won.
    #[instrument(skip(self))]
    pub async fn retry(
        &self,
        tenant: TenantUuid,
        log: DeliveryLogUuid,
    ) -> Result<DeliveryLog, NotificationError> {
        let original = self
            .logs
            .latest_attempt(tenant, log)
            .await?
            .ok_or(NotificationError::LogNotFound)?;

        match original.outcome {
            DeliveryOutcome::Success => return Err(NotificationError::AlreadySucceeded),
            DeliveryOutcome::Pending => return Err(NotificationError::StillPending),
            DeliveryOutcome::Failed => {}
        }

        let subscription = self.subscriptions.get(tenant, original.subscription).await?;

        if !subscription.active {
            return Err(NotificationError::SubscriptionInactive);
        }

        if original.attempt > subscription.max_retries {
            return Err(NotificationError::RetryLimitReached {
                attempt: original.attempt,
                max_retries: subscription.max_retries,
            });
        }

        let retried = self
            .attempt(
                &subscription,
                Attempt {
                    event: &original.event,
                    order: original.order,
                    payload: &original.payload,
                    number: original.attempt + 1,
                    retry_of: Some(original.uuid),
                },
            )
            .await
            .map_err(|error| match error {
                NotificationError::Repository(RepositoryError::AlreadyExists) => {
                    NotificationError::RetryConflict
                }
                other => other,
            })?;

        info!(
            attempt = retried.attempt,
            outcome = %retried.outcome,
            "webhook delivery retried"
        );

        Ok(retried)
    }

    /// The tenant's most recent failed deliveries.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub async fn list_failed(
        &self,
        tenant: TenantUuid,
        limit: u32,
    ) -> Result<Vec<DeliveryLog>, NotificationError> {
        Ok(self.logs.list_failed(tenant, limit).await?)
    }

    /// Wait for every published event to finish delivering.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));

        while let Some(result) = tasks.join_next().await {
            if let Err(error) = result {
                warn!(%error, "notification task did not complete");
            }
        }
    }

    async fn attempt(
        &self,
        subscription: &WebhookSubscription,
        attempt: Attempt<'_>,
    ) -> Result<DeliveryLog, NotificationError> {
        let body = serde_json::to_string(attempt.payload)?;

        let signature = subscription
            .secret
            .as_ref()
            .map(|secret| sign(secret, body.as_bytes()))
            .transpose()
            .map_err(|error| NotificationError::Signing(error.to_string()))?;

        let log = self
            .logs
            .append(NewDeliveryLog {
                uuid: DeliveryLogUuid::new(),
                tenant: subscription.tenant,
                subscription: subscription.uuid,
                event: attempt.event.to_string(),
                order: attempt.order,
                payload: attempt.payload.clone(),
                attempt: attempt.number,
                retry_of: attempt.retry_of,
            })
            .await?;

        let mut headers: Vec<(String, String)> = subscription
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        headers.push((EVENT_HEADER.to_string(), attempt.event.to_string()));
        headers.push((DELIVERY_HEADER.to_string(), log.uuid.to_string()));

        if let Some(signature) = signature {
            headers.push((SIGNATURE_HEADER.to_string(), signature));
        }

        let result = self
            .transport
            .send(WebhookRequest {
                url: subscription.url.clone(),
                body,
                headers,
                timeout: subscription.timeout,
            })
            .await;

        if !result.succeeded {
            warn!(
                subscription = %subscription.uuid,
                delivery = %log.uuid,
                code = ?result.response_code,
                error = ?result.error_message,
                "webhook delivery failed"
            );
        }

        let completed = self.logs.complete(log.uuid, result, Timestamp::now()).await?;

        Ok(completed.unwrap_or(log))
    }
}

impl EventPublisher for NotificationsService {
    fn publish(&self, event: OrderEvent) {
        let Ok(handle) = Handle::try_current() else {
            warn!(event = %event.kind, tenant = %event.tenant, "no runtime to deliver event on");
            return;
        };

        let service = self.clone();
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);

        while tasks.try_join_next().is_some() {}

        tasks.spawn_on(
            async move {
                if let Err(error) = service.deliver(&event).await {
                    warn!(%error, event = %event.kind, tenant = %event.tenant, "event fan-out failed");
                }
            },
            &handle,
        );
    }
}
