//! Credentials Repository

use async_trait::async_trait;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use mockall::automock;
use sqlx::{FromRow, PgPool, Postgres, Row, postgres::PgRow, query_as};
use uuid::Uuid;

use crate::domain::{
    credentials::records::{
        CourierApiKey, CourierCredential, CredentialKey, CredentialUuid, NewCredential,
    },
    errors::RepositoryError,
    tenants::records::TenantUuid,
};

const FIND_CREDENTIAL_SQL: &str = include_str!("sql/find_credential.sql");
const UPSERT_CREDENTIAL_SQL: &str = include_str!("sql/upsert_credential.sql");

/// Credential persistence operations.
///
/// Every operation is addressed by the full [`CredentialKey`]; there is no
/// lookup by pickup location alone.
#[automock]
#[async_trait]
pub trait CredentialsRepository: Send + Sync {
    /// Find the credential registered for the key.
    async fn find(&self, key: &CredentialKey)
    -> Result<Option<CourierCredential>, RepositoryError>;

    /// Insert or replace the credential registered for the key.
    async fn upsert(&self, credential: NewCredential)
    -> Result<CourierCredential, RepositoryError>;
}

/// PostgreSQL-backed credentials repository.
#[derive(Debug, Clone)]
pub struct PgCredentialsRepository {
    pool: PgPool,
}

impl PgCredentialsRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialsRepository for PgCredentialsRepository {
    async fn find(
        &self,
        key: &CredentialKey,
    ) -> Result<Option<CourierCredential>, RepositoryError> {
        query_as::<Postgres, CourierCredential>(FIND_CREDENTIAL_SQL)
            .bind(key.tenant().into_uuid())
            .bind(key.pickup_location())
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn upsert(
        &self,
        credential: NewCredential,
    ) -> Result<CourierCredential, RepositoryError> {
        query_as::<Postgres, CourierCredential>(UPSERT_CREDENTIAL_SQL)
            .bind(CredentialUuid::new().into_uuid())
            .bind(credential.key.tenant().into_uuid())
            .bind(credential.key.pickup_location())
            .bind(credential.api_key.expose())
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }
}

impl<'r> FromRow<'r, PgRow> for CourierCredential {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let tenant = TenantUuid::from_uuid(row.try_get::<Uuid, _>("tenant_uuid")?);
        let pickup_location: String = row.try_get("pickup_location")?;

        Ok(Self {
            uuid: CredentialUuid::from_uuid(row.try_get("uuid")?),
            key: CredentialKey::new(tenant, &pickup_location),
            api_key: CourierApiKey::new(row.try_get::<String, _>("api_key")?),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        })
    }
}
