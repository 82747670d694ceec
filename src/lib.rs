//! structure-store - Keep database structure descriptions per connection
//!
//! Each stored structure is a free-form description of a database schema
//! (DDL, a serialized catalogue, anything textual) tied to the id of the
//! database connection it was captured from.
//!
//! # Record Lifecycle
//!
//! Records are created with a structure and a connection id. The store
//! assigns the id and the `deleted = false` default. Afterwards only the
//! structure text and the `deleted` flag may change; rows are never removed.
//!
//! | Column | Type | Nullable | Default |
//! |--------|------|----------|---------|
//! | id | integer (auto-increment) | no | generated |
//! | structure | text | no | - |
//! | database_connection_id | integer | no | - |
//! | deleted | boolean | no | false |
//!
//! # Quick Start
//!
//! ```no_run
//! use structure_store::{Database, StructureUpdate};
//!
//! let db = Database::open_at("structures.db")?;
//! let record = db.create("CREATE TABLE t(x INT)", 42)?;
//!
//! db.update(record.id, &StructureUpdate::deleted(true))?;
//! assert!(db.find_by_id(record.id)?.deleted);
//! assert!(db.list_by_connection(42, false)?.is_empty());
//! # Ok::<(), structure_store::StoreError>(())
//! ```
//!
//! # Modules
//!
//! - [`db`]: Record types and the pooled SQLite store
//! - [`serve`]: JSON API over the store
//! - [`config`]: Environment-driven settings

pub mod config;
pub mod db;
pub mod error;
pub mod schema;
pub mod serve;

pub use config::Config;
pub use db::{CreateStructure, Database, StoreSummary, StructureRecord, StructureUpdate};
pub use error::{Result, StoreError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Core types are re-exported from the crate root
        let _ = CreateStructure::new("x", 1);
        let _ = StructureUpdate::deleted(true);
        let _ = Config::default();
        let _: StoreError = StoreError::NotFound { id: 1 };
    }

    #[test]
    fn test_store_accessible() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(dir.path().join("lib.db")).unwrap();
        let record: StructureRecord = db.create("x", 1).unwrap();
        assert_eq!(db.find_by_id(record.id).unwrap(), record);
    }
}
