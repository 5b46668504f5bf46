//! SQLite-backed implementation of `PersistenceGateway` (spec.md §4.2).

pub mod database;
pub mod repositories;

pub use database::Database;
pub use repositories::SqlitePersistenceGateway;
