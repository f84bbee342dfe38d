//! Credential Records

use std::fmt;

use jiff::Timestamp;
use zeroize::Zeroize;

use crate::{domain::tenants::records::TenantUuid, uuids::TypedUuid};

/// Credential UUID
pub type CredentialUuid = TypedUuid<CourierCredential>;

/// Composite lookup key for a courier credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    tenant: TenantUuid,
    pickup_location: String,
}

impl CredentialKey {
    #[must_use]
    pub fn new(tenant: TenantUuid, pickup_location: &str) -> Self {
        Self {
            tenant,
            pickup_location: pickup_location.trim().to_string(),
        }
    }

    #[must_use]
    pub const fn tenant(&self) -> TenantUuid {
        self.tenant
    }

    #[must_use]
    pub fn pickup_location(&self) -> &str {
        &self.pickup_location
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.pickup_location)
    }
}

/// Secret API key issued by the courier.
#[derive(Clone, PartialEq, Eq)]
pub struct CourierApiKey(String);

impl CourierApiKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CourierApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CourierApiKey(**redacted**)")
    }
}

impl Drop for CourierApiKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Courier Credential Record
#[derive(Debug, Clone)]
pub struct CourierCredential {
    pub uuid: CredentialUuid,
    pub key: CredentialKey,
    pub api_key: CourierApiKey,
    pub updated_at: Timestamp,
}

/// New Credential Data
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub key: CredentialKey,
    pub api_key: CourierApiKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_trims_the_pickup_location() {
        let tenant = TenantUuid::new();

        assert_eq!(
            CredentialKey::new(tenant, "  MAIN "),
            CredentialKey::new(tenant, "MAIN")
        );
    }

    #[test]
    fn same_location_for_different_tenants_is_a_different_key() {
        let a = CredentialKey::new(TenantUuid::new(), "MAIN");
        let b = CredentialKey::new(TenantUuid::new(), "MAIN");

        assert_ne!(a, b);
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = CourierApiKey::new("KEY_A");

        assert!(!format!("{key:?}").contains("KEY_A"));
    }
}
