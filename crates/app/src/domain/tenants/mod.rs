//! Tenants

pub mod records;
mod repository;

pub use repository::{MockTenantsRepository, PgTenantsRepository, TenantsRepository};
