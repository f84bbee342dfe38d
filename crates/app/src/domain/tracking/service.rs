//! Bulk tracking poller.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::future::join_all;
use jiff::Timestamp;
use mockall::automock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    carrier::CarrierGateway,
    credentials::{
        CredentialError, CredentialResolver,
        records::{CourierCredential, CredentialUuid},
    },
    notifications::events::{EventPublisher, OrderEvent},
    orders::{
        OrdersRepository,
        data::TrackingObservation,
        records::{Order, OrderUuid, TrackingId},
    },
    tenants::records::TenantUuid,
    tracking::{
        errors::TrackingError,
        report::{OrderRefresh, RefreshOutcome, RefreshReport, SkipReason},
        status::map_carrier_status,
    },
};

/// Pacing and batch bounds for tracking refreshes.
#[derive(Debug, Clone, Copy)]
pub struct TrackingSettings {
    /// Tracking ids per carrier call.
    pub page_size: usize,

    /// Pause between consecutive calls made with the same credential.
    pub page_delay: Duration,

    /// Most orders accepted by one refresh.
    pub max_batch: usize,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            page_delay: Duration::from_millis(500),
            max_batch: 100,
        }
    }
}

#[automock]
#[async_trait]
pub trait TrackingService: Send + Sync {
    /// Refresh the carrier status of the given orders, across tenants.
    async fn refresh_statuses(&self, orders: &[OrderUuid])
    -> Result<RefreshReport, TrackingError>;

    /// Refresh orders on behalf of one tenant; other tenants' orders are
    /// reported as not found.
    async fn refresh_tenant_statuses(
        &self,
        tenant: TenantUuid,
        orders: &[OrderUuid],
    ) -> Result<RefreshReport, TrackingError>;

    /// Refresh up to `limit` of the least recently tracked open orders.
    async fn refresh_due(&self, limit: usize) -> Result<RefreshReport, TrackingError>;
}

/// Orders sharing one resolved credential.
struct CredentialGroup {
    credential: CourierCredential,
    orders: Vec<Order>,
}

#[derive(Clone)]
pub struct BulkTrackingPoller {
    orders: Arc<dyn OrdersRepository>,
    credentials: CredentialResolver,
    carrier: Arc<dyn CarrierGateway>,
    publisher: Arc<dyn EventPublisher>,
    settings: TrackingSettings,
}

impl BulkTrackingPoller {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrdersRepository>,
        credentials: CredentialResolver,
        carrier: Arc<dyn CarrierGateway>,
        publisher: Arc<dyn EventPublisher>,
        settings: TrackingSettings,
    ) -> Self {
        Self {
            orders,
            credentials,
            carrier,
            publisher,
            settings,
        }
    }

    async fn refresh(
        &self,
        tenant: Option<TenantUuid>,
        requested: &[OrderUuid],
    ) -> Result<RefreshReport, TrackingError> {
        if requested.len() > self.settings.max_batch {
            return Err(TrackingError::BatchTooLarge {
                requested: requested.len(),
                max: self.settings.max_batch,
            });
        }

        let mut seen = FxHashSet::default();
        let requested: Vec<OrderUuid> = requested
            .iter()
            .copied()
            .filter(|order| seen.insert(*order))
            .collect();

        let mut loaded: FxHashMap<OrderUuid, Order> = self
            .orders
            .get_orders(&requested)
            .await?
            .into_iter()
            .filter(|order| tenant.is_none_or(|tenant| order.tenant == tenant))
            .map(|order| (order.uuid, order))
            .collect();

        let mut outcomes: FxHashMap<OrderUuid, RefreshOutcome> = FxHashMap::default();
        let mut groups: FxHashMap<CredentialUuid, CredentialGroup> = FxHashMap::default();

        for uuid in &requested {
            let Some(order) = loaded.remove(uuid) else {
                outcomes.insert(*uuid, skipped(SkipReason::NotFound));
                continue;
            };

            if order.tracking_id.is_none() {
                outcomes.insert(*uuid, skipped(SkipReason::NotDispatched));
                continue;
            }

            if order.status.is_terminal() {
                outcomes.insert(*uuid, skipped(SkipReason::Terminal(order.status)));
                continue;
            }

            match self.credentials.resolve_key(&order.credential_key()).await {
                Ok(credential) => groups
                    .entry(credential.uuid)
                    .or_insert_with(|| CredentialGroup {
                        credential,
                        orders: Vec::new(),
                    })
                    .orders
                    .push(order),
                Err(CredentialError::NotFound(key)) => {
                    debug!(order = %uuid, credential = %key, "skipping order without credential");
                    outcomes.insert(*uuid, skipped(SkipReason::NoCredential));
                }
                Err(error) => {
                    warn!(order = %uuid, %error, "credential lookup failed");
                    outcomes.insert(
                        *uuid,
                        RefreshOutcome::Failed {
                            error: error.to_string(),
                        },
                    );
                }
            }
        }

        let group_outcomes = join_all(
            groups
                .into_values()
                .map(|group| self.refresh_group(group)),
        )
        .await;

        outcomes.extend(group_outcomes.into_iter().flatten());

        let results = requested
            .into_iter()
            .map(|order| OrderRefresh {
                order,
                outcome: outcomes.remove(&order).unwrap_or(RefreshOutcome::Failed {
                    error: "order was not refreshed".to_string(),
                }),
            })
            .collect();

        let report = RefreshReport::from_results(results);

        info!(
            processed = report.total_processed,
            updated = report.total_updated,
            errors = report.total_errors,
            "tracking refresh complete"
        );

        Ok(report)
    }

    /// Track one credential's orders page by page, pausing between pages.
    #[instrument(skip_all, fields(credential = %group.credential.key, orders = group.orders.len()))]
    async fn refresh_group(&self, group: CredentialGroup) -> Vec<(OrderUuid, RefreshOutcome)> {
        let mut outcomes = Vec::with_capacity(group.orders.len());

        for (index, page) in group
            .orders
            .chunks(self.settings.page_size.max(1))
            .enumerate()
        {
            if index > 0 {
                tokio::time::sleep(self.settings.page_delay).await;
            }

            let tracking_ids: Vec<TrackingId> = page
                .iter()
                .filter_map(|order| order.tracking_id.clone())
                .collect();

            match self.carrier.track(&group.credential, &tracking_ids).await {
                Ok(tracked) => {
                    let statuses: FxHashMap<TrackingId, String> = tracked
                        .into_iter()
                        .map(|shipment| (shipment.tracking_id, shipment.carrier_status))
                        .collect();

                    for order in page {
                        let carrier_status = order
                            .tracking_id
                            .as_ref()
                            .and_then(|tracking_id| statuses.get(tracking_id));

                        let outcome = match carrier_status {
                            Some(carrier_status) => self.apply(order, carrier_status).await,
                            None => {
                                self.fail(order, "carrier returned no status for tracking id")
                                    .await
                            }
                        };

                        outcomes.push((order.uuid, outcome));
                    }
                }
                Err(error) => {
                    warn!(page = index, %error, "tracking call failed");

                    let message = error.to_string();

                    for order in page {
                        outcomes.push((order.uuid, self.fail(order, &message).await));
                    }
                }
            }
        }

        outcomes
    }

    /// Persist an observed carrier status and notify on a real transition.
    async fn apply(&self, order: &Order, carrier_status: &str) -> RefreshOutcome {
        let Some(tracking_id) = order.tracking_id.clone() else {
            return skipped(SkipReason::NotDispatched);
        };

        let observation = TrackingObservation {
            tracking_id,
            status: map_carrier_status(carrier_status),
            carrier_status: carrier_status.to_string(),
            observed_at: Timestamp::now(),
        };

        let change = match self.orders.apply_tracking(order.uuid, observation).await {
            Ok(Some(change)) => change,
            Ok(None) => {
                return RefreshOutcome::Failed {
                    error: "order is no longer tracked under this id".to_string(),
                };
            }
            Err(error) => {
                warn!(order = %order.uuid, %error, "failed to store tracking status");

                return RefreshOutcome::Failed {
                    error: error.to_string(),
                };
            }
        };

        if !change.changed() {
            return RefreshOutcome::Unchanged {
                status: change.current,
                carrier_status: carrier_status.to_string(),
            };
        }

        info!(
            order = %order.uuid,
            from = %change.previous,
            to = %change.current,
            "order status changed"
        );

        let mut updated = order.clone();
        updated.status = change.current;
        updated.carrier_status = Some(carrier_status.to_string());
        updated.last_error = None;

        self.publisher
            .publish(OrderEvent::status_changed(&updated, change.previous));

        RefreshOutcome::Updated {
            from: change.previous,
            to: change.current,
            carrier_status: carrier_status.to_string(),
        }
    }

    /// Record a tracking failure without touching the order's status.
    async fn fail(&self, order: &Order, error: &str) -> RefreshOutcome {
        if let Err(storage_error) = self
            .orders
            .record_tracking_error(order.uuid, error.to_string(), Timestamp::now())
            .await
        {
            warn!(order = %order.uuid, %storage_error, "failed to record tracking error");
        }

        RefreshOutcome::Failed {
            error: error.to_string(),
        }
    }
}

fn skipped(reason: SkipReason) -> RefreshOutcome {
    RefreshOutcome::Skipped { reason }
}

#[async_trait]
impl TrackingService for BulkTrackingPoller {
    #[instrument(skip_all, fields(requested = orders.len()))]
    async fn refresh_statuses(
        &self,
        orders: &[OrderUuid],
    ) -> Result<RefreshReport, TrackingError> {
        self.refresh(None, orders).await
    }

    #[instrument(skip_all, fields(%tenant, requested = orders.len()))]
    async fn refresh_tenant_statuses(
        &self,
        tenant: TenantUuid,
        orders: &[OrderUuid],
    ) -> Result<RefreshReport, TrackingError> {
        self.refresh(Some(tenant), orders).await
    }

    #[instrument(skip(self))]
    async fn refresh_due(&self, limit: usize) -> Result<RefreshReport, TrackingError> {
        let limit = limit.min(self.settings.max_batch);
        let due = self
            .orders
            .list_trackable(u32::try_from(limit).unwrap_or(u32::MAX))
            .await?;

        if due.is_empty() {
            return Ok(RefreshReport::default());
        }

        self.refresh(None, &due).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use testresult::TestResult;
    use tokio::time::Instant;

    use crate::{
        domain::{
            carrier::{CarrierError, MockCarrierGateway, TrackedShipment},
            credentials::records::{CourierApiKey, CredentialKey, NewCredential},
            notifications::events::EventKind,
            orders::records::OrderStatus,
        },
        test::{InMemoryStore, RecordingPublisher, fixtures},
    };

    use super::*;

    struct Harness {
        store: InMemoryStore,
        resolver: CredentialResolver,
        publisher: Arc<RecordingPublisher>,
    }

    impl Harness {
        fn new() -> Self {
            let store = InMemoryStore::new();

            Self {
                resolver: CredentialResolver::new(Arc::new(store.clone())),
                store,
                publisher: Arc::new(RecordingPublisher::default()),
            }
        }

        async fn credential(&self, tenant: TenantUuid, location: &str, key: &str) -> TestResult {
            self.resolver
                .register(NewCredential {
                    key: CredentialKey::new(tenant, location),
                    api_key: CourierApiKey::new(key),
                })
                .await?;

            Ok(())
        }

        fn poller(&self, carrier: MockCarrierGateway) -> BulkTrackingPoller {
            BulkTrackingPoller::new(
                Arc::new(self.store.clone()),
                self.resolver.clone(),
                Arc::new(carrier),
                self.publisher.clone(),
                TrackingSettings::default(),
            )
        }
    }

    fn echo_status(status: &'static str) -> MockCarrierGateway {
        let mut carrier = MockCarrierGateway::new();
        carrier.expect_track().returning(move |_, tracking_ids| {
            Ok(tracking_ids
                .iter()
                .map(|tracking_id| TrackedShipment {
                    tracking_id: tracking_id.clone(),
                    carrier_status: status.to_string(),
                })
                .collect())
        });

        carrier
    }

    #[tokio::test(start_paused = true)]
    async fn one_hundred_twenty_orders_make_three_paced_calls() -> TestResult {
        let harness = Harness::new();
        let tenant = TenantUuid::new();
        harness.credential(tenant, "MAIN", "KEY_A").await?;

        let mut orders = Vec::new();
        for index in 0..120 {
            orders.push(
                fixtures::dispatched_order(
                    &harness.store,
                    tenant,
                    &format!("ORD-{index}"),
                    "MAIN",
                    &format!("WB{index:03}"),
                )
                .await?
                .uuid,
            );
        }

        let calls: Arc<Mutex<Vec<(usize, Instant)>>> = Arc::default();
        let recorded = calls.clone();

        let mut carrier = MockCarrierGateway::new();
        carrier
            .expect_track()
            .times(3)
            .returning(move |_, tracking_ids| {
                let mut calls = recorded.lock().expect("lock");
                calls.push((tracking_ids.len(), Instant::now()));

                if calls.len() == 2 {
                    return Err(CarrierError::Transient("status 500".into()));
                }

                Ok(tracking_ids
                    .iter()
                    .map(|tracking_id| TrackedShipment {
                        tracking_id: tracking_id.clone(),
                        carrier_status: "Delivered".to_string(),
                    })
                    .collect())
            });

        let poller = BulkTrackingPoller::new(
            Arc::new(harness.store.clone()),
            harness.resolver.clone(),
            Arc::new(carrier),
            harness.publisher.clone(),
            TrackingSettings {
                max_batch: 120,
                ..TrackingSettings::default()
            },
        );

        let report = poller.refresh_statuses(&orders).await?;

        let calls = calls.lock().expect("lock");
        let sizes: Vec<usize> = calls.iter().map(|(size, _)| *size).collect();
        let delay = TrackingSettings::default().page_delay;

        assert_eq!(sizes, [50, 50, 20]);
        assert!(calls[1].1 - calls[0].1 >= delay);
        assert!(calls[2].1 - calls[1].1 >= delay);

        assert_eq!(report.total_processed, 120);
        assert_eq!(report.total_updated, 70);
        assert_eq!(report.total_errors, 50);

        for (index, order) in orders.iter().enumerate() {
            let expected_failure = (50..100).contains(&index);
            let outcome = report.outcome(*order).expect("every order has an outcome");

            assert_eq!(
                matches!(outcome, RefreshOutcome::Failed { .. }),
                expected_failure,
                "order {index} outcome {outcome:?}"
            );
        }

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn different_credentials_are_not_paced_against_each_other() -> TestResult {
        let harness = Harness::new();
        let tenant_a = TenantUuid::new();
        let tenant_b = TenantUuid::new();
        harness.credential(tenant_a, "MAIN", "KEY_A").await?;
        harness.credential(tenant_b, "MAIN", "KEY_B").await?;

        let a = fixtures::dispatched_order(&harness.store, tenant_a, "A-1", "MAIN", "WBA").await?;
        let b = fixtures::dispatched_order(&harness.store, tenant_b, "B-1", "MAIN", "WBB").await?;

        let keys: Arc<Mutex<Vec<String>>> = Arc::default();
        let seen = keys.clone();

        let mut carrier = MockCarrierGateway::new();
        carrier
            .expect_track()
            .times(2)
            .returning(move |credential, tracking_ids| {
                seen.lock()
                    .expect("lock")
                    .push(format!("{}:{}", credential.api_key.expose(), tracking_ids[0]));

                Ok(vec![TrackedShipment {
                    tracking_id: tracking_ids[0].clone(),
                    carrier_status: "In Transit".to_string(),
                }])
            });

        let started = Instant::now();
        let report = harness
            .poller(carrier)
            .refresh_statuses(&[a.uuid, b.uuid])
            .await?;

        let mut keys = keys.lock().expect("lock").clone();
        keys.sort();

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(keys, ["KEY_A:WBA", "KEY_B:WBB"]);
        assert_eq!(report.total_updated, 2);

        Ok(())
    }

    #[tokio::test]
    async fn manifested_then_delivered_notifies_once() -> TestResult {
        let harness = Harness::new();
        let tenant = TenantUuid::new();
        harness.credential(tenant, "MAIN", "KEY_A").await?;
        let order = fixtures::dispatched_order(&harness.store, tenant, "ORD-1", "MAIN", "WB1").await?;

        let first = harness
            .poller(echo_status("Manifested"))
            .refresh_statuses(&[order.uuid])
            .await?;

        assert!(harness.publisher.kinds().is_empty());
        assert!(matches!(
            first.outcome(order.uuid),
            Some(RefreshOutcome::Unchanged {
                status: OrderStatus::Dispatched,
                ..
            })
        ));

        let second = harness
            .poller(echo_status("Delivered"))
            .refresh_statuses(&[order.uuid])
            .await?;

        assert_eq!(second.total_updated, 1);
        assert_eq!(harness.publisher.kinds(), [EventKind::StatusChanged]);

        let events = harness.publisher.events();
        let event = events.first().expect("one event");
        assert_eq!(event.order, Some(order.uuid));
        assert_eq!(event.data["previousStatus"], "dispatched");

        let stored = harness.store.order(order.uuid).expect("order exists");
        assert_eq!(stored.status, OrderStatus::Delivered);
        assert_eq!(stored.carrier_status.as_deref(), Some("Delivered"));

        Ok(())
    }

    #[tokio::test]
    async fn repeated_refresh_without_change_emits_nothing() -> TestResult {
        let harness = Harness::new();
        let tenant = TenantUuid::new();
        harness.credential(tenant, "MAIN", "KEY_A").await?;
        let order = fixtures::dispatched_order(&harness.store, tenant, "ORD-1", "MAIN", "WB1").await?;

        let poller = harness.poller(echo_status("In Transit"));

        poller.refresh_statuses(&[order.uuid]).await?;
        let events_after_first = harness.publisher.kinds().len();

        let second = poller.refresh_statuses(&[order.uuid]).await?;

        assert_eq!(events_after_first, 1);
        assert_eq!(harness.publisher.kinds().len(), 1);
        assert_eq!(second.total_updated, 0);

        Ok(())
    }

    #[tokio::test]
    async fn unresolvable_and_ineligible_orders_are_skipped() -> TestResult {
        let harness = Harness::new();
        let tenant = TenantUuid::new();
        harness.credential(tenant, "MAIN", "KEY_A").await?;

        let undispatched = harness
            .store
            .create_order(fixtures::new_order(tenant, "ORD-1", "MAIN"))
            .await?;
        let orphaned =
            fixtures::dispatched_order(&harness.store, tenant, "ORD-2", "WAREHOUSE-9", "WB2")
                .await?;
        let missing = OrderUuid::new();

        let mut carrier = MockCarrierGateway::new();
        carrier.expect_track().never();

        let poller = harness.poller(carrier);

        let report = poller
            .refresh_statuses(&[undispatched.uuid, orphaned.uuid, missing])
            .await?;

        assert_eq!(
            report.outcome(undispatched.uuid),
            Some(&skipped(SkipReason::NotDispatched))
        );
        assert_eq!(
            report.outcome(orphaned.uuid),
            Some(&skipped(SkipReason::NoCredential))
        );
        assert_eq!(report.outcome(missing), Some(&skipped(SkipReason::NotFound)));
        assert_eq!(report.total_errors, 0);

        Ok(())
    }

    #[tokio::test]
    async fn terminal_orders_are_not_polled() -> TestResult {
        let harness = Harness::new();
        let tenant = TenantUuid::new();
        harness.credential(tenant, "MAIN", "KEY_A").await?;
        let order = fixtures::dispatched_order(&harness.store, tenant, "ORD-1", "MAIN", "WB1").await?;

        harness
            .poller(echo_status("Delivered"))
            .refresh_statuses(&[order.uuid])
            .await?;

        let mut carrier = MockCarrierGateway::new();
        carrier.expect_track().never();

        let report = harness.poller(carrier).refresh_statuses(&[order.uuid]).await?;

        assert_eq!(
            report.outcome(order.uuid),
            Some(&skipped(SkipReason::Terminal(OrderStatus::Delivered)))
        );

        Ok(())
    }

    #[tokio::test]
    async fn tenant_refresh_ignores_other_tenants_orders() -> TestResult {
        let harness = Harness::new();
        let owner = TenantUuid::new();
        harness.credential(owner, "MAIN", "KEY_A").await?;
        let order = fixtures::dispatched_order(&harness.store, owner, "ORD-1", "MAIN", "WB1").await?;

        let mut carrier = MockCarrierGateway::new();
        carrier.expect_track().never();

        let report = harness
            .poller(carrier)
            .refresh_tenant_statuses(TenantUuid::new(), &[order.uuid])
            .await?;

        assert_eq!(report.outcome(order.uuid), Some(&skipped(SkipReason::NotFound)));

        Ok(())
    }

    #[tokio::test]
    async fn oversized_batches_are_rejected() {
        let harness = Harness::new();
        let orders: Vec<OrderUuid> = (0..101).map(|_| OrderUuid::new()).collect();

        let result = harness
            .poller(MockCarrierGateway::new())
            .refresh_statuses(&orders)
            .await;

        assert!(matches!(
            result,
            Err(TrackingError::BatchTooLarge {
                requested: 101,
                max: 100
            })
        ));
    }

    #[tokio::test]
    async fn ids_missing_from_the_carrier_response_fail_individually() -> TestResult {
        let harness = Harness::new();
        let tenant = TenantUuid::new();
        harness.credential(tenant, "MAIN", "KEY_A").await?;
        let known = fixtures::dispatched_order(&harness.store, tenant, "ORD-1", "MAIN", "WB1").await?;
        let unknown = fixtures::dispatched_order(&harness.store, tenant, "ORD-2", "MAIN", "WB2").await?;

        let mut carrier = MockCarrierGateway::new();
        carrier.expect_track().returning(|_, _| {
            Ok(vec![TrackedShipment {
                tracking_id: TrackingId::new("WB1"),
                carrier_status: "In Transit".to_string(),
            }])
        });

        let report = harness
            .poller(carrier)
            .refresh_statuses(&[known.uuid, unknown.uuid])
            .await?;

        assert_eq!(report.total_updated, 1);
        assert!(matches!(
            report.outcome(unknown.uuid),
            Some(RefreshOutcome::Failed { .. })
        ));

        Ok(())
    }

    #[tokio::test]
    async fn due_orders_are_refreshed_least_recently_tracked_first() -> TestResult {
        let harness = Harness::new();
        let tenant = TenantUuid::new();
        harness.credential(tenant, "MAIN", "KEY_A").await?;
        fixtures::dispatched_order(&harness.store, tenant, "ORD-1", "MAIN", "WB1").await?;
        fixtures::dispatched_order(&harness.store, tenant, "ORD-2", "MAIN", "WB2").await?;

        let report = harness
            .poller(echo_status("In Transit"))
            .refresh_due(10)
            .await?;

        assert_eq!(report.total_processed, 2);
        assert_eq!(report.total_updated, 2);

        Ok(())
    }
}
