//! Delivery Logs Repository

use async_trait::async_trait;
use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use mockall::automock;
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, Row, postgres::PgRow, query_as, types::Json};
use uuid::Uuid;

use crate::domain::{
    errors::RepositoryError,
    notifications::records::{
        DeliveryLog, DeliveryLogUuid, DeliveryResult, NewDeliveryLog, SubscriptionUuid,
    },
    orders::records::OrderUuid,
    tenants::records::TenantUuid,
};

const APPEND_DELIVERY_LOG_SQL: &str = include_str!("../sql/append_delivery_log.sql");
const COMPLETE_DELIVERY_LOG_SQL: &str = include_str!("../sql/complete_delivery_log.sql");
const LATEST_DELIVERY_ATTEMPT_SQL: &str = include_str!("../sql/latest_delivery_attempt.sql");
const LIST_FAILED_DELIVERY_LOGS_SQL: &str =
    include_str!("../sql/list_failed_delivery_logs.sql");

/// Append-only delivery history.
///
/// A log is written `pending` before its call and completed exactly once.
#[automock]
#[async_trait]
pub trait DeliveryLogsRepository: Send + Sync {
    async fn append(&self, log: NewDeliveryLog) -> Result<DeliveryLog, RepositoryError>;

    /// Record the result of a pending attempt. Completed logs are left alone.
    async fn complete(
        &self,
        log: DeliveryLogUuid,
        result: DeliveryResult,
        at: Timestamp,
    ) -> Result<Option<DeliveryLog>, RepositoryError>;

    /// The newest attempt in the retry chain starting at `log`, which is
    /// `log` itself until it has been retried.
    async fn latest_attempt(
        &self,
        tenant: TenantUuid,
        log: DeliveryLogUuid,
    ) -> Result<Option<DeliveryLog>, RepositoryError>;

    /// Most recent failed attempts first.
    async fn list_failed(
        &self,
        tenant: TenantUuid,
        limit: u32,
    ) -> Result<Vec<DeliveryLog>, RepositoryError>;
}

#[derive(Debug, Clone)]
pub struct PgDeliveryLogsRepository {
    pool: PgPool,
}

impl PgDeliveryLogsRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryLogsRepository for PgDeliveryLogsRepository {
    async fn append(&self, log: NewDeliveryLog) -> Result<DeliveryLog, RepositoryError> {
        query_as::<Postgres, DeliveryLog>(APPEND_DELIVERY_LOG_SQL)
            .bind(log.uuid.into_uuid())
            .bind(log.tenant.into_uuid())
            .bind(log.subscription.into_uuid())
            .bind(log.event)
            .bind(log.order.map(OrderUuid::into_uuid))
            .bind(Json(log.payload))
            .bind(i32::try_from(log.attempt).unwrap_or(i32::MAX))
            .bind(log.retry_of.map(DeliveryLogUuid::into_uuid))
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn complete(
        &self,
        log: DeliveryLogUuid,
        result: DeliveryResult,
        at: Timestamp,
    ) -> Result<Option<DeliveryLog>, RepositoryError> {
        query_as::<Postgres, DeliveryLog>(COMPLETE_DELIVERY_LOG_SQL)
            .bind(log.into_uuid())
            .bind(result.outcome().as_str())
            .bind(result.response_code.map(i32::from))
            .bind(result.response_body)
            .bind(result.error_message)
            .bind(SqlxTimestamp::from(at))
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn latest_attempt(
        &self,
        tenant: TenantUuid,
        log: DeliveryLogUuid,
    ) -> Result<Option<DeliveryLog>, RepositoryError> {
        query_as::<Postgres, DeliveryLog>(LATEST_DELIVERY_ATTEMPT_SQL)
            .bind(tenant.into_uuid())
            .bind(log.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn list_failed(
        &self,
        tenant: TenantUuid,
        limit: u32,
    ) -> Result<Vec<DeliveryLog>, RepositoryError> {
        query_as::<Postgres, DeliveryLog>(LIST_FAILED_DELIVERY_LOGS_SQL)
            .bind(tenant.into_uuid())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(Into::into)
    }
}

impl<'r> FromRow<'r, PgRow> for DeliveryLog {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let outcome: String = row.try_get("outcome")?;
        let attempt: i32 = row.try_get("attempt")?;

        Ok(Self {
            uuid: DeliveryLogUuid::from_uuid(row.try_get("uuid")?),
            tenant: TenantUuid::from_uuid(row.try_get("tenant_uuid")?),
            subscription: SubscriptionUuid::from_uuid(row.try_get("subscription_uuid")?),
            event: row.try_get("event")?,
            order: row
                .try_get::<Option<Uuid>, _>("order_uuid")?
                .map(OrderUuid::from_uuid),
            payload: row.try_get::<Json<Value>, _>("payload")?.0,
            outcome: outcome.parse().map_err(|error: String| sqlx::Error::ColumnDecode {
                index: "outcome".to_string(),
                source: error.into(),
            })?,
            response_code: row
                .try_get::<Option<i32>, _>("response_code")?
                .and_then(|code| u16::try_from(code).ok()),
            response_body: row.try_get("response_body")?,
            error_message: row.try_get("error_message")?,
            attempt: u32::try_from(attempt).unwrap_or(1),
            retry_of: row
                .try_get::<Option<Uuid>, _>("retry_of")?
                .map(DeliveryLogUuid::from_uuid),
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            completed_at: row
                .try_get::<Option<SqlxTimestamp>, _>("completed_at")?
                .map(SqlxTimestamp::to_jiff),
        })
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::{
        domain::notifications::{
            SubscriptionsRepository, PgSubscriptionsRepository, records::DeliveryOutcome,
        },
        test::{TestDb, fixtures},
    };

    use super::*;

    #[tokio::test]
    #[ignore = "requires a Docker daemon for the Postgres testcontainer"]
    async fn logs_are_completed_exactly_once() -> TestResult {
        let db = TestDb::new().await;
        let tenant = db.create_tenant("Tenant").await;
        let subscription = PgSubscriptionsRepository::new(db.pool().clone())
            .create_subscription(fixtures::new_subscription(tenant, &["*"]))
            .await?;
        let repository = PgDeliveryLogsRepository::new(db.pool().clone());

        let log = repository
            .append(NewDeliveryLog {
                uuid: DeliveryLogUuid::new(),
                tenant,
                subscription: subscription.uuid,
                event: "order.dispatched".to_string(),
                order: None,
                payload: serde_json::json!({ "event": "order.dispatched" }),
                attempt: 1,
                retry_of: None,
            })
            .await?;

        assert_eq!(log.outcome, DeliveryOutcome::Pending);

        let failed = DeliveryResult {
            succeeded: false,
            response_code: None,
            response_body: None,
            error_message: Some("timed out after 30s".to_string()),
        };

        let completed = repository
            .complete(log.uuid, failed.clone(), Timestamp::now())
            .await?;
        let again = repository.complete(log.uuid, failed, Timestamp::now()).await?;

        assert_eq!(completed.map(|log| log.outcome), Some(DeliveryOutcome::Failed));
        assert!(again.is_none());
        assert_eq!(repository.list_failed(tenant, 10).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a Docker daemon for the Postgres testcontainer"]
    async fn retry_chains_resolve_to_their_newest_attempt() -> TestResult {
        let db = TestDb::new().await;
        let tenant = db.create_tenant("Tenant").await;
        let subscription = PgSubscriptionsRepository::new(db.pool().clone())
            .create_subscription(fixtures::new_subscription(tenant, &["*"]))
            .await?;
        let repository = PgDeliveryLogsRepository::new(db.pool().clone());

        let attempt = |number: u32, retry_of: Option<DeliveryLogUuid>| NewDeliveryLog {
            uuid: DeliveryLogUuid::new(),
            tenant,
            subscription: subscription.uuid,
            event: "order.dispatched".to_string(),
            order: None,
            payload: serde_json::json!({ "event": "order.dispatched" }),
            attempt: number,
            retry_of,
        };

        let first = repository.append(attempt(1, None)).await?;
        let second = repository.append(attempt(2, Some(first.uuid))).await?;
        let third = repository.append(attempt(3, Some(second.uuid))).await?;

        let latest = repository.latest_attempt(tenant, first.uuid).await?;
        assert_eq!(latest.map(|log| log.uuid), Some(third.uuid));

        let duplicate = repository.append(attempt(2, Some(first.uuid))).await;
        assert!(matches!(duplicate, Err(RepositoryError::AlreadyExists)));

        let foreign = repository.latest_attempt(TenantUuid::new(), first.uuid).await?;
        assert!(foreign.is_none());

        Ok(())
    }
}
