//! Orders Repository

use async_trait::async_trait;
use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use mockall::automock;
use sqlx::{FromRow, PgPool, Postgres, Row, postgres::PgRow, query, query_as, types::Json};
use uuid::Uuid;

use crate::domain::{
    errors::RepositoryError,
    orders::{
        data::{AttemptFailure, NewOrder, StatusChange, TrackingObservation},
        records::{MAX_RETRIES, Order, claim_expiry, OrderStatus, OrderUuid, ShipmentDetails, TrackingId},
    },
    tenants::records::TenantUuid,
};

const CREATE_ORDER_SQL: &str = include_str!("sql/create_order.sql");
const GET_ORDER_SQL: &str = include_str!("sql/get_order.sql");
const GET_ORDERS_SQL: &str = include_str!("sql/get_orders.sql");
const BEGIN_ATTEMPT_SQL: &str = include_str!("sql/begin_attempt.sql");
const COMPLETE_DISPATCH_SQL: &str = include_str!("sql/complete_dispatch.sql");
const FAIL_ATTEMPT_SQL: &str = include_str!("sql/fail_attempt.sql");
const MARK_FAILED_SQL: &str = include_str!("sql/mark_failed.sql");
const RECORD_ERROR_SQL: &str = include_str!("sql/record_error.sql");
const APPLY_TRACKING_SQL: &str = include_str!("sql/apply_tracking.sql");
const RECORD_TRACKING_ERROR_SQL: &str = include_str!("sql/record_tracking_error.sql");
const REQUEUE_ORDER_SQL: &str = include_str!("sql/requeue_order.sql");
const LIST_DISPATCHABLE_SQL: &str = include_str!("sql/list_dispatchable.sql");
const LIST_TRACKABLE_SQL: &str = include_str!("sql/list_trackable.sql");

/// Order persistence operations.
///
/// Every state transition is a single conditional write: methods returning
/// `Option` yield `None` when the order was not in a state that allows the
/// transition, and nothing is changed.
#[automock]
#[async_trait]
pub trait OrdersRepository: Send + Sync {
    async fn create_order(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    /// Fetch an order owned by `tenant`.
    async fn get_order(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Fetch every existing order among `orders`, across tenants.
    async fn get_orders(&self, orders: &[OrderUuid]) -> Result<Vec<Order>, RepositoryError>;

    /// Charge one dispatch attempt and move the order to `dispatch_requested`.
    ///
    /// Refused once the order has a tracking id, has left the dispatch
    /// states, or has used all of its attempts, and while another attempt
    /// holds an unexpired claim on it. Completing or failing the attempt
    /// releases the claim.
    async fn begin_attempt(
        &self,
        order: OrderUuid,
        at: Timestamp,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Store the carrier's tracking id and refund the charged attempt.
    async fn complete_dispatch(
        &self,
        order: OrderUuid,
        tracking_id: TrackingId,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Record a failed attempt, failing the order permanently when the
    /// failure is permanent or the attempts are used up.
    async fn fail_attempt(
        &self,
        order: OrderUuid,
        failure: AttemptFailure,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Fail an undispatched order without charging an attempt.
    async fn mark_failed(
        &self,
        order: OrderUuid,
        error: String,
    ) -> Result<Option<Order>, RepositoryError>;

    async fn record_error(&self, order: OrderUuid, error: String) -> Result<(), RepositoryError>;

    /// Store a tracking observation, advancing the status only forwards.
    ///
    /// The returned change carries the status read under the same row lock
    /// as the write.
    async fn apply_tracking(
        &self,
        order: OrderUuid,
        observation: TrackingObservation,
    ) -> Result<Option<StatusChange>, RepositoryError>;

    async fn record_tracking_error(
        &self,
        order: OrderUuid,
        error: String,
        at: Timestamp,
    ) -> Result<(), RepositoryError>;

    /// Return a permanently failed, never-dispatched order to `pending`.
    async fn requeue(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Orders still awaiting a tracking id, least recently attempted first.
    async fn list_dispatchable(&self, limit: u32) -> Result<Vec<Order>, RepositoryError>;

    /// Non-terminal orders with a tracking id, least recently tracked first.
    async fn list_trackable(&self, limit: u32) -> Result<Vec<OrderUuid>, RepositoryError>;
}

/// PostgreSQL-backed orders repository.
#[derive(Debug, Clone)]
pub struct PgOrdersRepository {
    pool: PgPool,
}

impl PgOrdersRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrdersRepository for PgOrdersRepository {
    async fn create_order(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        query_as::<Postgres, Order>(CREATE_ORDER_SQL)
            .bind(order.uuid.into_uuid())
            .bind(order.tenant.into_uuid())
            .bind(order.reference)
            .bind(order.pickup_location)
            .bind(order.carrier)
            .bind(Json(order.shipment))
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn get_order(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<Option<Order>, RepositoryError> {
        query_as::<Postgres, Order>(GET_ORDER_SQL)
            .bind(tenant.into_uuid())
            .bind(order.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn get_orders(&self, orders: &[OrderUuid]) -> Result<Vec<Order>, RepositoryError> {
        let uuids: Vec<Uuid> = orders.iter().map(|order| order.into_uuid()).collect();

        query_as::<Postgres, Order>(GET_ORDERS_SQL)
            .bind(uuids)
            .fetch_all(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn begin_attempt(
        &self,
        order: OrderUuid,
        at: Timestamp,
    ) -> Result<Option<Order>, RepositoryError> {
        query_as::<Postgres, Order>(BEGIN_ATTEMPT_SQL)
            .bind(order.into_uuid())
            .bind(SqlxTimestamp::from(at))
            .bind(MAX_RETRIES.cast_signed())
            .bind(SqlxTimestamp::from(claim_expiry(at)))
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn complete_dispatch(
        &self,
        order: OrderUuid,
        tracking_id: TrackingId,
    ) -> Result<Option<Order>, RepositoryError> {
        query_as::<Postgres, Order>(COMPLETE_DISPATCH_SQL)
            .bind(order.into_uuid())
            .bind(tracking_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn fail_attempt(
        &self,
        order: OrderUuid,
        failure: AttemptFailure,
    ) -> Result<Option<Order>, RepositoryError> {
        query_as::<Postgres, Order>(FAIL_ATTEMPT_SQL)
            .bind(order.into_uuid())
            .bind(failure.error)
            .bind(failure.permanent)
            .bind(MAX_RETRIES.cast_signed())
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn mark_failed(
        &self,
        order: OrderUuid,
        error: String,
    ) -> Result<Option<Order>, RepositoryError> {
        query_as::<Postgres, Order>(MARK_FAILED_SQL)
            .bind(order.into_uuid())
            .bind(error)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn record_error(&self, order: OrderUuid, error: String) -> Result<(), RepositoryError> {
        query(RECORD_ERROR_SQL)
            .bind(order.into_uuid())
            .bind(error)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn apply_tracking(
        &self,
        order: OrderUuid,
        observation: TrackingObservation,
    ) -> Result<Option<StatusChange>, RepositoryError> {
        let replaceable: Vec<&str> = observation
            .status
            .advances_from()
            .into_iter()
            .map(OrderStatus::as_str)
            .collect();

        query_as::<Postgres, StatusChange>(APPLY_TRACKING_SQL)
            .bind(order.into_uuid())
            .bind(observation.tracking_id.as_str())
            .bind(observation.status.as_str())
            .bind(replaceable)
            .bind(observation.carrier_status)
            .bind(SqlxTimestamp::from(observation.observed_at))
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn record_tracking_error(
        &self,
        order: OrderUuid,
        error: String,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        query(RECORD_TRACKING_ERROR_SQL)
            .bind(order.into_uuid())
            .bind(error)
            .bind(SqlxTimestamp::from(at))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn requeue(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<Option<Order>, RepositoryError> {
        query_as::<Postgres, Order>(REQUEUE_ORDER_SQL)
            .bind(tenant.into_uuid())
            .bind(order.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn list_dispatchable(&self, limit: u32) -> Result<Vec<Order>, RepositoryError> {
        query_as::<Postgres, Order>(LIST_DISPATCHABLE_SQL)
            .bind(i64::from(limit))
            .bind(MAX_RETRIES.cast_signed())
            .bind(SqlxTimestamp::from(claim_expiry(Timestamp::now())))
            .fetch_all(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn list_trackable(&self, limit: u32) -> Result<Vec<OrderUuid>, RepositoryError> {
        let rows = query(LIST_TRACKABLE_SQL)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| Ok(OrderUuid::from_uuid(row.try_get("uuid")?)))
            .collect()
    }
}

fn decode_status(row: &PgRow, column: &str) -> sqlx::Result<OrderStatus> {
    row.try_get::<String, _>(column)?
        .parse()
        .map_err(|error| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(error),
        })
}

impl<'r> FromRow<'r, PgRow> for Order {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let retry_count: i32 = row.try_get("retry_count")?;

        Ok(Self {
            uuid: OrderUuid::from_uuid(row.try_get("uuid")?),
            tenant: TenantUuid::from_uuid(row.try_get("tenant_uuid")?),
            reference: row.try_get("reference")?,
            pickup_location: row.try_get("pickup_location")?,
            carrier: row.try_get("carrier")?,
            shipment: row.try_get::<Json<ShipmentDetails>, _>("shipment")?.0,
            tracking_id: row
                .try_get::<Option<String>, _>("tracking_id")?
                .map(TrackingId::new),
            status: decode_status(row, "status")?,
            carrier_status: row.try_get("carrier_status")?,
            retry_count: u32::try_from(retry_count).map_err(|error| {
                sqlx::Error::ColumnDecode {
                    index: "retry_count".to_string(),
                    source: Box::new(error),
                }
            })?,
            last_error: row.try_get("last_error")?,
            last_attempt_at: row
                .try_get::<Option<SqlxTimestamp>, _>("last_attempt_at")?
                .map(SqlxTimestamp::to_jiff),
            tracked_at: row
                .try_get::<Option<SqlxTimestamp>, _>("tracked_at")?
                .map(SqlxTimestamp::to_jiff),
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        })
    }
}

impl<'r> FromRow<'r, PgRow> for StatusChange {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            order: OrderUuid::from_uuid(row.try_get("uuid")?),
            tenant: TenantUuid::from_uuid(row.try_get("tenant_uuid")?),
            previous: decode_status(row, "previous_status")?,
            current: decode_status(row, "status")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use testresult::TestResult;

    use crate::{
        domain::orders::records::ATTEMPT_CLAIM_TTL,
        test::{TestDb, fixtures},
    };

    use super::*;

    async fn setup() -> (TestDb, PgOrdersRepository, Order) {
        let db = TestDb::new().await;
        let tenant = db.create_tenant("Tenant").await;
        let repository = PgOrdersRepository::new(db.pool().clone());

        let order = repository
            .create_order(fixtures::new_order(tenant, "ORD-1", "MAIN"))
            .await
            .expect("order should be created");

        (db, repository, order)
    }

    #[tokio::test]
    #[ignore = "requires a Docker daemon for the Postgres testcontainer"]
    async fn attempts_stop_being_charged_at_the_retry_bound() -> TestResult {
        let (_db, repository, order) = setup().await;

        for _ in 0..MAX_RETRIES {
            let charged = repository.begin_attempt(order.uuid, Timestamp::now()).await?;
            assert!(charged.is_some());

            repository
                .fail_attempt(
                    order.uuid,
                    AttemptFailure {
                        error: "status 503".to_string(),
                        permanent: false,
                    },
                )
                .await?;
        }

        let refused = repository.begin_attempt(order.uuid, Timestamp::now()).await?;

        assert!(refused.is_none());

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a Docker daemon for the Postgres testcontainer"]
    async fn tracking_id_is_written_once() -> TestResult {
        let (_db, repository, order) = setup().await;

        repository.begin_attempt(order.uuid, Timestamp::now()).await?;

        let dispatched = repository
            .complete_dispatch(order.uuid, TrackingId::new("WB1"))
            .await?
            .expect("first completion should apply");

        let second = repository
            .complete_dispatch(order.uuid, TrackingId::new("WB2"))
            .await?;

        assert_eq!(dispatched.tracking_id, Some(TrackingId::new("WB1")));
        assert_eq!(dispatched.retry_count, 0);
        assert!(second.is_none());

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a Docker daemon for the Postgres testcontainer"]
    async fn tracking_reports_previous_status_and_never_regresses() -> TestResult {
        let (_db, repository, order) = setup().await;
        let tracking_id = TrackingId::new("WB1");

        repository.begin_attempt(order.uuid, Timestamp::now()).await?;
        repository
            .complete_dispatch(order.uuid, tracking_id.clone())
            .await?;

        let observe = |status, raw: &str| TrackingObservation {
            tracking_id: tracking_id.clone(),
            status,
            carrier_status: raw.to_string(),
            observed_at: Timestamp::now(),
        };

        let delivered = repository
            .apply_tracking(order.uuid, observe(OrderStatus::Delivered, "Delivered"))
            .await?
            .expect("order should be tracked");

        let stale = repository
            .apply_tracking(order.uuid, observe(OrderStatus::InTransit, "In Transit"))
            .await?
            .expect("order should be tracked");

        assert_eq!(delivered.previous, OrderStatus::Dispatched);
        assert_eq!(delivered.current, OrderStatus::Delivered);
        assert!(!stale.changed());
        assert_eq!(stale.current, OrderStatus::Delivered);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a Docker daemon for the Postgres testcontainer"]
    async fn claimed_attempts_block_other_charges_until_released() -> TestResult {
        let (_db, repository, order) = setup().await;
        let now = Timestamp::now();

        assert!(repository.begin_attempt(order.uuid, now).await?.is_some());
        assert!(repository.begin_attempt(order.uuid, now).await?.is_none());
        assert!(repository.list_dispatchable(10).await?.is_empty());

        let lapsed = now.checked_add(ATTEMPT_CLAIM_TTL)?.checked_add(SignedDuration::from_secs(1))?;
        let reclaimed = repository.begin_attempt(order.uuid, lapsed).await?;

        assert_eq!(reclaimed.map(|order| order.retry_count), Some(2));

        repository
            .fail_attempt(
                order.uuid,
                AttemptFailure {
                    error: "status 503".to_string(),
                    permanent: false,
                },
            )
            .await?;

        assert!(repository.begin_attempt(order.uuid, Timestamp::now()).await?.is_some());

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a Docker daemon for the Postgres testcontainer"]
    async fn requeue_only_applies_to_failed_orders() -> TestResult {
        let (_db, repository, order) = setup().await;

        assert!(repository.requeue(order.tenant, order.uuid).await?.is_none());

        repository
            .mark_failed(order.uuid, "no credential".to_string())
            .await?;

        let requeued = repository
            .requeue(order.tenant, order.uuid)
            .await?
            .expect("failed order should requeue");

        assert_eq!(requeued.status, OrderStatus::Pending);
        assert_eq!(requeued.retry_count, 0);
        assert_eq!(requeued.last_error, None);

        Ok(())
    }
}
