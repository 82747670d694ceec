//! SQLite database with Diesel ORM
//!
//! Stores structure records: one schema description per row, tied to a
//! database connection by id. Rows are never physically removed; the
//! `deleted` column is a tombstone.

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::schema::database_structure;
use diesel::prelude::*;
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Diesel Models
// ============================================================================

/// Queryable structure record (database row)
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = database_structure)]
pub struct StructureRecord {
    pub id: i64,
    pub structure: String,
    pub database_connection_id: i64,
    pub deleted: bool,
}

/// Insertable structure record. `id` and `deleted` come from the table.
#[derive(Insertable)]
#[diesel(table_name = database_structure)]
struct NewStructureRecord<'a> {
    structure: &'a str,
    database_connection_id: i64,
}

#[derive(AsChangeset)]
#[diesel(table_name = database_structure)]
struct StructureChangeset<'a> {
    structure: Option<&'a str>,
    deleted: Option<bool>,
}

// ============================================================================
// Operation Inputs
// ============================================================================

/// Create request as it arrives from outside the crate.
///
/// Both fields are optional here so that a missing field is reported as a
/// validation error instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateStructure {
    pub structure: Option<String>,
    pub database_connection_id: Option<i64>,
}

impl CreateStructure {
    pub fn new(structure: impl Into<String>, database_connection_id: i64) -> Self {
        Self {
            structure: Some(structure.into()),
            database_connection_id: Some(database_connection_id),
        }
    }

    fn validate(&self) -> Result<(&str, i64)> {
        let structure = self
            .structure
            .as_deref()
            .ok_or_else(|| StoreError::validation("structure is required"))?;
        let connection_id = self
            .database_connection_id
            .ok_or_else(|| StoreError::validation("database_connection_id is required"))?;
        Ok((structure, connection_id))
    }
}

/// Partial update of a structure record.
///
/// `structure` distinguishes "absent" (`None`) from an explicit null
/// (`Some(None)`); the latter is rejected. The connection id is not
/// updatable, so unknown fields are refused when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructureUpdate {
    #[serde(default, deserialize_with = "present")]
    pub structure: Option<Option<String>>,
    #[serde(default)]
    pub deleted: Option<bool>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl StructureUpdate {
    pub fn structure(structure: impl Into<String>) -> Self {
        Self {
            structure: Some(Some(structure.into())),
            deleted: None,
        }
    }

    pub fn deleted(deleted: bool) -> Self {
        Self {
            structure: None,
            deleted: Some(deleted),
        }
    }

    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = Some(deleted);
        self
    }

    fn changeset(&self) -> Result<StructureChangeset<'_>> {
        let structure = match &self.structure {
            Some(Some(s)) => Some(s.as_str()),
            Some(None) => return Err(StoreError::validation("structure must not be null")),
            None => None,
        };

        if structure.is_none() && self.deleted.is_none() {
            return Err(StoreError::validation("update must set structure or deleted"));
        }

        Ok(StructureChangeset {
            structure,
            deleted: self.deleted,
        })
    }
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Per-connection SQLite settings applied when the pool opens a connection.
/// Writers queue on the busy timeout; WAL keeps readers off the write lock.
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA journal_mode = WAL;",
            BUSY_TIMEOUT_MS
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Database connection wrapper with connection pool
pub struct Database {
    pool: DbPool,
    path: PathBuf,
}

impl Database {
    /// Open database using environment configuration
    pub fn open() -> Result<Self> {
        Self::open_with(&Config::from_env()?)
    }

    /// Open database at specified path with the default pool size
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(&Config::default().with_db_path(path.as_ref()))
    }

    pub fn open_with(config: &Config) -> Result<Self> {
        let path_str = config.db_path.to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let db = Self {
            pool,
            path: config.db_path.clone(),
        };
        db.init_schema()?;
        log::debug!("opened {} (pool size {})", path_str, config.pool_size);
        Ok(db)
    }

    /// Path of the backing SQLite file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| StoreError::Connection(e.to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS database_structure (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                structure TEXT NOT NULL,
                database_connection_id INTEGER NOT NULL,
                deleted BOOLEAN NOT NULL DEFAULT FALSE
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(
            "CREATE INDEX IF NOT EXISTS idx_structure_connection ON database_structure(database_connection_id)",
        )
        .execute(&mut conn)?;

        Ok(())
    }

    fn load(conn: &mut SqliteConnection, id: i64) -> Result<StructureRecord> {
        database_structure::table
            .find(id)
            .select(StructureRecord::as_select())
            .first(conn)
            .optional()?
            .ok_or(StoreError::NotFound { id })
    }

    // ========================================================================
    // Structure Records
    // ========================================================================

    /// Store a new structure for a connection
    pub fn create(&self, structure: &str, database_connection_id: i64) -> Result<StructureRecord> {
        let mut conn = self.get_conn()?;
        let new_record = NewStructureRecord {
            structure,
            database_connection_id,
        };

        let record = conn.immediate_transaction::<_, StoreError, _>(|conn| {
            diesel::insert_into(database_structure::table)
                .values(&new_record)
                .execute(conn)?;

            let id: i64 = diesel::select(diesel::dsl::sql::<diesel::sql_types::BigInt>("last_insert_rowid()"))
                .first(conn)?;

            Self::load(conn, id)
        })?;

        log::info!(
            "created structure {} for connection {}",
            record.id,
            record.database_connection_id
        );
        Ok(record)
    }

    /// Validate an external create request, then store it
    pub fn create_from(&self, input: &CreateStructure) -> Result<StructureRecord> {
        let (structure, connection_id) = input.validate()?;
        self.create(structure, connection_id)
    }

    /// Apply a partial update to an existing record
    pub fn update(&self, id: i64, changes: &StructureUpdate) -> Result<StructureRecord> {
        let changeset = changes.changeset()?;
        let mut conn = self.get_conn()?;

        let record = conn.immediate_transaction::<_, StoreError, _>(|conn| {
            let updated = diesel::update(database_structure::table.find(id))
                .set(&changeset)
                .execute(conn)?;

            if updated == 0 {
                return Err(StoreError::NotFound { id });
            }

            Self::load(conn, id)
        })?;

        log::info!("updated structure {} (deleted: {})", record.id, record.deleted);
        Ok(record)
    }

    /// Mark a record deleted. The row stays in the table.
    pub fn soft_delete(&self, id: i64) -> Result<StructureRecord> {
        self.update(id, &StructureUpdate::deleted(true))
    }

    /// Clear the tombstone on a record
    pub fn restore(&self, id: i64) -> Result<StructureRecord> {
        self.update(id, &StructureUpdate::deleted(false))
    }

    /// Get a record by id, tombstoned or not
    pub fn find_by_id(&self, id: i64) -> Result<StructureRecord> {
        let mut conn = self.get_conn()?;
        log::debug!("find structure {}", id);
        Self::load(&mut conn, id)
    }

    /// Get the records of one connection, oldest first
    pub fn list_by_connection(
        &self,
        database_connection_id: i64,
        include_deleted: bool,
    ) -> Result<Vec<StructureRecord>> {
        let mut conn = self.get_conn()?;
        log::debug!(
            "list structures for connection {} (include deleted: {})",
            database_connection_id,
            include_deleted
        );

        let records = if include_deleted {
            database_structure::table
                .filter(database_structure::database_connection_id.eq(database_connection_id))
                .order(database_structure::id.asc())
                .select(StructureRecord::as_select())
                .load(&mut conn)?
        } else {
            database_structure::table
                .filter(database_structure::database_connection_id.eq(database_connection_id))
                .filter(database_structure::deleted.eq(false))
                .order(database_structure::id.asc())
                .select(StructureRecord::as_select())
                .load(&mut conn)?
        };

        Ok(records)
    }

    /// Get the newest live record for a connection
    pub fn latest_for_connection(&self, database_connection_id: i64) -> Result<Option<StructureRecord>> {
        let mut conn = self.get_conn()?;

        let record = database_structure::table
            .filter(database_structure::database_connection_id.eq(database_connection_id))
            .filter(database_structure::deleted.eq(false))
            .order(database_structure::id.desc())
            .select(StructureRecord::as_select())
            .first(&mut conn)
            .optional()?;

        Ok(record)
    }

    /// Write a consistent copy of the database, WAL contents included.
    /// Fails if `target` already exists.
    pub fn backup_to(&self, target: &Path) -> Result<u64> {
        let mut conn = self.get_conn()?;
        diesel::sql_query("VACUUM INTO ?")
            .bind::<diesel::sql_types::Text, _>(target.to_string_lossy().to_string())
            .execute(&mut conn)?;

        let bytes = std::fs::metadata(target)?.len();
        log::info!("backed up {} to {}", self.path.display(), target.display());
        Ok(bytes)
    }

    /// Get summary statistics
    pub fn get_summary(&self) -> Result<StoreSummary> {
        let mut conn = self.get_conn()?;

        // One read transaction so the counts come from the same snapshot
        let (total, deleted, connections) = conn.transaction::<_, StoreError, _>(|conn| {
            let total: i64 = database_structure::table
                .count()
                .get_result(conn)?;

            let deleted: i64 = database_structure::table
                .filter(database_structure::deleted.eq(true))
                .count()
                .get_result(conn)?;

            let connections: i64 = database_structure::table
                .filter(database_structure::deleted.eq(false))
                .select(diesel::dsl::count_distinct(database_structure::database_connection_id))
                .first(conn)?;

            Ok((total, deleted, connections))
        })?;

        Ok(StoreSummary {
            total,
            active: total - deleted,
            deleted,
            connections,
        })
    }
}

// ============================================================================
// Additional Types
// ============================================================================

/// Summary statistics from the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub total: i64,
    pub active: i64,
    pub deleted: i64,
    /// Connections with at least one live record
    pub connections: i64,
}
