//! Courier fulfillment, tracking and notification services shared by the
//! operator CLI and the worker.

pub mod cache;
pub mod context;
pub mod database;
pub mod domain;
pub mod text;

#[cfg(test)]
mod test;

mod uuids;
