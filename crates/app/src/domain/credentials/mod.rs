//! Courier Credentials
//!
//! A courier credential is addressed by the pair of tenant and pickup
//! location. Pickup location names are chosen by tenants and collide across
//! tenants, so [`records::CredentialKey`] is the only lookup key the
//! repository and resolver accept.

pub mod errors;
pub mod records;
mod repository;
mod resolver;

pub use errors::CredentialError;
pub use repository::{CredentialsRepository, MockCredentialsRepository, PgCredentialsRepository};
pub use resolver::CredentialResolver;
