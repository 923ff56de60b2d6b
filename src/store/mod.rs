//! Persistence layer: CRM records and the SQLite backend

pub mod models;
pub mod sqlite;
pub mod traits;

pub use models::*;
pub use sqlite::SqliteStore;
pub use traits::CrmStore;

#[cfg(test)]
pub(crate) mod mock;
