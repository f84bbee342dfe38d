//! Subscriptions Repository

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use mockall::automock;
use sqlx::{FromRow, PgPool, Postgres, Row, postgres::PgRow, query, query_as, types::Json};

use crate::domain::{
    errors::RepositoryError,
    notifications::{
        records::{
            NewSubscription, SigningSecret, SubscriptionUpdate, SubscriptionUuid,
            WebhookSubscription,
        },
        transport::DEFAULT_WEBHOOK_TIMEOUT,
    },
    tenants::records::TenantUuid,
};

const CREATE_SUBSCRIPTION_SQL: &str = include_str!("../sql/create_subscription.sql");
const GET_SUBSCRIPTION_SQL: &str = include_str!("../sql/get_subscription.sql");
const UPDATE_SUBSCRIPTION_SQL: &str = include_str!("../sql/update_subscription.sql");
const SET_SUBSCRIPTION_ACTIVE_SQL: &str = include_str!("../sql/set_subscription_active.sql");
const DELETE_SUBSCRIPTION_SQL: &str = include_str!("../sql/delete_subscription.sql");
const LIST_ACTIVE_SUBSCRIPTIONS_SQL: &str =
    include_str!("../sql/list_active_subscriptions.sql");

/// Tenant-scoped webhook subscription persistence.
#[automock]
#[async_trait]
pub trait SubscriptionsRepository: Send + Sync {
    async fn create_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<WebhookSubscription, RepositoryError>;

    async fn get_subscription(
        &self,
        tenant: TenantUuid,
        subscription: SubscriptionUuid,
    ) -> Result<Option<WebhookSubscription>, RepositoryError>;

    async fn update_subscription(
        &self,
        tenant: TenantUuid,
        subscription: SubscriptionUuid,
        update: SubscriptionUpdate,
    ) -> Result<Option<WebhookSubscription>, RepositoryError>;

    async fn set_active(
        &self,
        tenant: TenantUuid,
        subscription: SubscriptionUuid,
        active: bool,
    ) -> Result<Option<WebhookSubscription>, RepositoryError>;

    /// Returns whether a subscription was deleted.
    async fn delete_subscription(
        &self,
        tenant: TenantUuid,
        subscription: SubscriptionUuid,
    ) -> Result<bool, RepositoryError>;

    async fn list_active(
        &self,
        tenant: TenantUuid,
    ) -> Result<Vec<WebhookSubscription>, RepositoryError>;
}

#[derive(Debug, Clone)]
pub struct PgSubscriptionsRepository {
    pool: PgPool,
}

impl PgSubscriptionsRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn timeout_seconds(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_secs().max(1)).unwrap_or(i32::MAX)
}

fn retries(max_retries: u32) -> i32 {
    i32::try_from(max_retries).unwrap_or(i32::MAX)
}

#[async_trait]
impl SubscriptionsRepository for PgSubscriptionsRepository {
    async fn create_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<WebhookSubscription, RepositoryError> {
        query_as::<Postgres, WebhookSubscription>(CREATE_SUBSCRIPTION_SQL)
            .bind(subscription.uuid.into_uuid())
            .bind(subscription.tenant.into_uuid())
            .bind(subscription.url)
            .bind(subscription.events)
            .bind(subscription.secret.as_ref().map(SigningSecret::expose))
            .bind(retries(subscription.max_retries))
            .bind(timeout_seconds(
                subscription.timeout.unwrap_or(DEFAULT_WEBHOOK_TIMEOUT),
            ))
            .bind(Json(subscription.headers))
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn get_subscription(
        &self,
        tenant: TenantUuid,
        subscription: SubscriptionUuid,
    ) -> Result<Option<WebhookSubscription>, RepositoryError> {
        query_as::<Postgres, WebhookSubscription>(GET_SUBSCRIPTION_SQL)
            .bind(tenant.into_uuid())
            .bind(subscription.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn update_subscription(
        &self,
        tenant: TenantUuid,
        subscription: SubscriptionUuid,
        update: SubscriptionUpdate,
    ) -> Result<Option<WebhookSubscription>, RepositoryError> {
        query_as::<Postgres, WebhookSubscription>(UPDATE_SUBSCRIPTION_SQL)
            .bind(tenant.into_uuid())
            .bind(subscription.into_uuid())
            .bind(update.url)
            .bind(update.events)
            .bind(update.secret.as_ref().map(SigningSecret::expose))
            .bind(retries(update.max_retries))
            .bind(timeout_seconds(update.timeout))
            .bind(Json(update.headers))
            .bind(update.active)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn set_active(
        &self,
        tenant: TenantUuid,
        subscription: SubscriptionUuid,
        active: bool,
    ) -> Result<Option<WebhookSubscription>, RepositoryError> {
        query_as::<Postgres, WebhookSubscription>(SET_SUBSCRIPTION_ACTIVE_SQL)
            .bind(tenant.into_uuid())
            .bind(subscription.into_uuid())
            .bind(active)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn delete_subscription(
        &self,
        tenant: TenantUuid,
        subscription: SubscriptionUuid,
    ) -> Result<bool, RepositoryError> {
        let result = query(DELETE_SUBSCRIPTION_SQL)
            .bind(tenant.into_uuid())
            .bind(subscription.into_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_active(
        &self,
        tenant: TenantUuid,
    ) -> Result<Vec<WebhookSubscription>, RepositoryError> {
        query_as::<Postgres, WebhookSubscription>(LIST_ACTIVE_SUBSCRIPTIONS_SQL)
            .bind(tenant.into_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(Into::into)
    }
}

impl<'r> FromRow<'r, PgRow> for WebhookSubscription {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let max_retries: i32 = row.try_get("max_retries")?;
        let timeout_seconds: i32 = row.try_get("timeout_seconds")?;

        Ok(Self {
            uuid: SubscriptionUuid::from_uuid(row.try_get("uuid")?),
            tenant: TenantUuid::from_uuid(row.try_get("tenant_uuid")?),
            url: row.try_get("url")?,
            events: row.try_get("events")?,
            secret: row
                .try_get::<Option<String>, _>("secret")?
                .map(SigningSecret::new),
            max_retries: u32::try_from(max_retries).unwrap_or_default(),
            timeout: Duration::from_secs(u64::try_from(timeout_seconds).unwrap_or_default()),
            headers: row
                .try_get::<Json<BTreeMap<String, String>>, _>("headers")?
                .0,
            active: row.try_get("active")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        })
    }
}
