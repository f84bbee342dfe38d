//! Credential Resolver

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::{
    cache::{DEFAULT_CACHE_CAPACITY, KeyedCache},
    domain::{
        credentials::{
            errors::CredentialError,
            records::{CourierCredential, CredentialKey, NewCredential},
            repository::CredentialsRepository,
        },
        tenants::records::TenantUuid,
    },
};

/// Resolves the courier credential a tenant must use for a pickup location.
#[derive(Clone)]
pub struct CredentialResolver {
    repository: Arc<dyn CredentialsRepository>,
    cache: Arc<KeyedCache<CredentialKey, CourierCredential>>,
}

impl CredentialResolver {
    #[must_use]
    pub fn new(repository: Arc<dyn CredentialsRepository>) -> Self {
        Self::with_cache(
            repository,
            Arc::new(KeyedCache::new("credentials", DEFAULT_CACHE_CAPACITY)),
        )
    }

    #[must_use]
    pub fn with_cache(
        repository: Arc<dyn CredentialsRepository>,
        cache: Arc<KeyedCache<CredentialKey, CourierCredential>>,
    ) -> Self {
        Self { repository, cache }
    }

    /// Resolve the credential registered for `(tenant, pickup_location)`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::NotFound`] when the tenant has no credential
    /// for the location, or a storage error when the lookup fails.
    pub async fn resolve(
        &self,
        tenant: TenantUuid,
        pickup_location: &str,
    ) -> Result<CourierCredential, CredentialError> {
        self.resolve_key(&CredentialKey::new(tenant, pickup_location))
            .await
    }

    /// Resolve a credential by its composite key.
    ///
    /// # Errors
    ///
    /// See [`CredentialResolver::resolve`].
    #[instrument(skip(self), fields(credential = %key))]
    pub async fn resolve_key(
        &self,
        key: &CredentialKey,
    ) -> Result<CourierCredential, CredentialError> {
        if let Some(credential) = self.cache.get(key).await {
            return Ok(credential);
        }

        let generation = self.cache.generation().await;

        let credential = self
            .repository
            .find(key)
            .await?
            .ok_or_else(|| CredentialError::NotFound(key.clone()))?;

        if credential.key != *key {
            // A store returning another tenant's row is a defect, not a miss.
            tracing::error!(
                requested = %key,
                returned = %credential.key,
                "credential store returned a row for a different key"
            );

            return Err(CredentialError::NotFound(key.clone()));
        }

        self.cache
            .insert(key.clone(), credential.clone(), generation)
            .await;

        debug!("credential loaded into cache");

        Ok(credential)
    }

    /// Register or replace a credential and invalidate its cached copy.
    ///
    /// # Errors
    ///
    /// Returns an error when the key or secret is empty or the write fails.
    #[instrument(skip(self, credential), fields(credential = %credential.key))]
    pub async fn register(
        &self,
        credential: NewCredential,
    ) -> Result<CourierCredential, CredentialError> {
        if credential.key.pickup_location().is_empty() {
            return Err(CredentialError::Invalid("pickup location must not be empty"));
        }

        if credential.api_key.expose().trim().is_empty() {
            return Err(CredentialError::Invalid("api key must not be empty"));
        }

        let key = credential.key.clone();
        let stored = self.repository.upsert(credential).await;

        self.cache.invalidate(&key).await;

        let stored = stored?;

        info!("courier credential registered");

        Ok(stored)
    }
}
