//! Shared test support.

mod db;
mod publisher;

pub use db::TestDb;
pub use memory::InMemoryStore;
pub use publisher::RecordingPublisher;
