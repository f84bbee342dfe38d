//! Fulfillment service.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use tracing::{error, info, instrument, warn};

use crate::domain::{
    carrier::CarrierGateway,
    credentials::{CredentialError, CredentialResolver, records::CourierCredential},
    fulfillment::errors::DispatchError,
    notifications::events::{EventKind, EventPublisher, OrderEvent},
    orders::{
        OrdersRepository,
        data::AttemptFailure,
        records::{Order, OrderStatus, OrderUuid},
    },
    tenants::records::TenantUuid,
};

/// Tally of one scheduled dispatch sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSweep {
    pub attempted: usize,
    pub dispatched: usize,
    pub failed: usize,
}

#[automock]
#[async_trait]
pub trait FulfillmentService: Send + Sync {
    /// Make one dispatch attempt for an order.
    ///
    /// The attempt is charged against the order before the carrier is
    /// called. Carrier and credential failures are persisted on the order
    /// and returned.
    async fn dispatch(&self, tenant: TenantUuid, order: OrderUuid)
    -> Result<Order, DispatchError>;

    /// Push the current shipment details of a dispatched order to the carrier.
    async fn amend(&self, tenant: TenantUuid, order: OrderUuid) -> Result<Order, DispatchError>;

    /// Return a permanently failed, never-dispatched order to `pending`.
    async fn requeue(&self, tenant: TenantUuid, order: OrderUuid)
    -> Result<Order, DispatchError>;

    /// Make one attempt for each of up to `limit` orders awaiting dispatch.
    async fn dispatch_due(&self, limit: u32) -> Result<DispatchSweep, DispatchError>;
}

/// Dispatcher backed by the courier gateway.
#[derive(Clone)]
pub struct CourierFulfillmentService {
    orders: Arc<dyn OrdersRepository>,
    credentials: CredentialResolver,
    carrier: Arc<dyn CarrierGateway>,
    publisher: Arc<dyn EventPublisher>,
}

impl CourierFulfillmentService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrdersRepository>,
        credentials: CredentialResolver,
        carrier: Arc<dyn CarrierGateway>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            orders,
            credentials,
            carrier,
            publisher,
        }
    }

    async fn load(&self, tenant: TenantUuid, order: OrderUuid) -> Result<Order, DispatchError> {
        self.orders
            .get_order(tenant, order)
            .await?
            .ok_or(DispatchError::NotFound)
    }

    /// Resolve the order's credential, failing the order when none exists.
    async fn credential_for(&self, order: &Order) -> Result<CourierCredential, DispatchError> {
        match self.credentials.resolve_key(&order.credential_key()).await {
            Ok(credential) => Ok(credential),
            Err(not_found @ CredentialError::NotFound(_)) => {
                warn!(error = %not_found, "no courier credential for pickup location");

                if let Some(failed) = self
                    .orders
                    .mark_failed(order.uuid, not_found.to_string())
                    .await?
                {
                    self.publisher
                        .publish(OrderEvent::for_order(EventKind::Failed, &failed));
                }

                Err(not_found.into())
            }
            Err(other) => Err(other.into()),
        }
    }
}

/// Reject orders no dispatch attempt may be made for.
fn ensure_dispatchable(order: &Order) -> Result<(), DispatchError> {
    if order.tracking_id.is_some()
        || matches!(
            order.status,
            OrderStatus::Dispatched
                | OrderStatus::InTransit
                | OrderStatus::Delivered
                | OrderStatus::Returned
        )
    {
        return Err(DispatchError::AlreadyDispatched);
    }

    if order.retries_exhausted() {
        return Err(DispatchError::MaxRetriesExceeded);
    }

    if order.status == OrderStatus::FailedPermanent {
        return Err(DispatchError::PermanentlyFailed);
    }

    Ok(())
}

#[async_trait]
impl FulfillmentService for CourierFulfillmentService {
    #[instrument(skip(self), fields(%tenant, %order))]
    async fn dispatch(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<Order, DispatchError> {
        let order = self.load(tenant, order).await?;

        ensure_dispatchable(&order)?;

        let credential = self.credential_for(&order).await?;

        let charged = self
            .orders
            .begin_attempt(order.uuid, Timestamp::now())
            .await?
            .ok_or(DispatchError::Conflict)?;

        match self.carrier.create_shipment(&credential, &charged).await {
            Ok(tracking_id) => {
                let dispatched = match self
                    .orders
                    .complete_dispatch(order.uuid, tracking_id.clone())
                    .await
                {
                    Ok(Some(dispatched)) => dispatched,
                    Ok(None) => {
                        error!(%tracking_id, "carrier issued a tracking id the order no longer accepts");

                        return Err(DispatchError::Conflict);
                    }
                    Err(storage) => {
                        // The claim stays held, keeping sweeps off the order
                        // until it lapses.
                        error!(
                            %tracking_id,
                            error = %storage,
                            "carrier issued a tracking id that could not be recorded"
                        );

                        return Err(storage.into());
                    }
                };

                info!(%tracking_id, "order dispatched");

                self.publisher
                    .publish(OrderEvent::for_order(EventKind::Dispatched, &dispatched));

                Ok(dispatched)
            }
            Err(carrier_error) => {
                let failure = AttemptFailure {
                    error: carrier_error.to_string(),
                    permanent: !carrier_error.is_retryable(),
                };

                let recorded = self.orders.fail_attempt(order.uuid, failure).await?;

                match recorded {
                    Some(failed) if failed.status == OrderStatus::FailedPermanent => {
                        warn!(
                            error = %carrier_error,
                            attempts = failed.retry_count,
                            "order dispatch failed permanently"
                        );

                        self.publisher
                            .publish(OrderEvent::for_order(EventKind::Failed, &failed));
                    }
                    Some(pending) => {
                        warn!(
                            error = %carrier_error,
                            attempts = pending.retry_count,
                            "order dispatch attempt failed"
                        );
                    }
                    None => {
                        warn!(error = %carrier_error, "order changed before failure was recorded");
                    }
                }

                Err(carrier_error.into())
            }
        }
    }

    #[instrument(skip(self), fields(%tenant, %order))]
    async fn amend(&self, tenant: TenantUuid, order: OrderUuid) -> Result<Order, DispatchError> {
        let order = self.load(tenant, order).await?;

        let Some(tracking_id) = order.tracking_id.clone() else {
            return Err(DispatchError::NotDispatched);
        };

        if order.status != OrderStatus::Dispatched {
            return Err(DispatchError::NotDispatched);
        }

        let credential = match self.credentials.resolve_key(&order.credential_key()).await {
            Ok(credential) => credential,
            Err(error) => {
                self.orders
                    .record_error(order.uuid, error.to_string())
                    .await?;

                return Err(error.into());
            }
        };

        if let Err(error) = self
            .carrier
            .edit_shipment(&credential, &order, &tracking_id)
            .await
        {
            warn!(%error, "shipment amendment rejected");

            self.orders
                .record_error(order.uuid, error.to_string())
                .await?;

            return Err(error.into());
        }

        info!(%tracking_id, "shipment amended");

        Ok(order)
    }

    #[instrument(skip(self), fields(%tenant, %order))]
    async fn requeue(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<Order, DispatchError> {
        if let Some(requeued) = self.orders.requeue(tenant, order).await? {
            info!("order requeued for dispatch");

            return Ok(requeued);
        }

        let current = self.load(tenant, order).await?;

        if current.tracking_id.is_some() {
            return Err(DispatchError::AlreadyDispatched);
        }

        Err(DispatchError::NotRequeueable(current.status))
    }

    #[instrument(skip(self))]
    async fn dispatch_due(&self, limit: u32) -> Result<DispatchSweep, DispatchError> {
        let due = self.orders.list_dispatchable(limit).await?;
        let mut sweep = DispatchSweep::default();

        for order in due {
            sweep.attempted += 1;

            match self.dispatch(order.tenant, order.uuid).await {
                Ok(_) => sweep.dispatched += 1,
                Err(DispatchError::Repository(error)) => return Err(error.into()),
                Err(_) => sweep.failed += 1,
            }
        }

        if sweep.attempted > 0 {
            info!(
                attempted = sweep.attempted,
                dispatched = sweep.dispatched,
                failed = sweep.failed,
                "dispatch sweep complete"
            );
        }

        Ok(sweep)
    }
}
