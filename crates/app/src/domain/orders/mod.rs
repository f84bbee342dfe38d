//! Orders

pub mod data;
pub mod records;
mod repository;

pub use repository::{MockOrdersRepository, OrdersRepository, PgOrdersRepository};
