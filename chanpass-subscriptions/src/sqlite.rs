//! SQLite-backed subscription store.
//!
//! One table, one row per user:
//!
//! ```sql
//! subscriptions(
//!     user_id           INTEGER PRIMARY KEY,
//!     expire_at         INTEGER NOT NULL,   -- epoch seconds
//!     payment_ref       TEXT NULL,
//!     notified_expiring INTEGER NOT NULL DEFAULT 0
//! )
//! ```
//!
//! Opening a database migrates it in place. Migrations only rename or add
//! columns, and each step is guarded by a `PRAGMA table_info` check, so
//! reopening is always safe. Databases written by the first version of the
//! bot (`expire_time`, `payment_id`, `notification_sent`) are upgraded
//! without losing rows.
//!
//! # Thread Safety
//!
//! The connection sits behind a mutex that is held for exactly one store
//! operation. All SQLite work runs on `tokio::task::spawn_blocking`.

use crate::errors::StorageError;
use crate::record::{SubscriptionRecord, UserId};
use crate::storage::{RecordUpdate, Result, SubscriptionStore};
use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS subscriptions (
    user_id           INTEGER PRIMARY KEY,
    expire_at         INTEGER NOT NULL,
    payment_ref       TEXT NULL,
    notified_expiring INTEGER NOT NULL DEFAULT 0
);
"#;

/// Legacy column name → current column name
const RENAMED_COLUMNS: [(&str, &str); 3] = [
    ("expire_time", "expire_at"),
    ("payment_id", "payment_ref"),
    ("notification_sent", "notified_expiring"),
];

/// Columns added after the first release, with their definitions
const ADDED_COLUMNS: [(&str, &str); 2] = [
    ("payment_ref", "TEXT NULL"),
    ("notified_expiring", "INTEGER NOT NULL DEFAULT 0"),
];

const SELECT_COLUMNS: &str = "user_id, expire_at, payment_ref, notified_expiring";

/// SQLite implementation of [`SubscriptionStore`]
#[derive(Clone)]
pub struct SqliteSubscriptionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSubscriptionStore {
    /// Open (or create) the database at `path` and migrate it
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Read every record from the database at `path` without writing to it.
    ///
    /// The file is opened read-only and is neither created nor migrated;
    /// legacy column names are read in place. A missing file or table reads
    /// as empty.
    pub fn snapshot(path: impl AsRef<Path>) -> Result<Vec<SubscriptionRecord>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let columns = Self::columns(&conn)?;
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let expire_at = source_column(&columns, "expire_at")
            .filter(|_| columns.contains("user_id"))
            .ok_or_else(|| {
                StorageError::Corrupt("subscriptions table has no user or expiry column".into())
            })?;
        let sql = format!(
            "SELECT user_id, {}, {}, COALESCE({}, 0) FROM subscriptions ORDER BY user_id",
            expire_at,
            source_column(&columns, "payment_ref").unwrap_or("NULL"),
            source_column(&columns, "notified_expiring").unwrap_or("0"),
        );

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Wrap an already open connection, migrating its schema
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StorageError::Database(format!("schema init failed: {}", e)))?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        let mut columns = Self::columns(conn)?;

        for (legacy, current) in RENAMED_COLUMNS {
            if columns.contains(legacy) && !columns.contains(current) {
                conn.execute_batch(&format!(
                    "ALTER TABLE subscriptions RENAME COLUMN {legacy} TO {current}"
                ))
                .map_err(|e| {
                    StorageError::Database(format!("migration {legacy}→{current}: {e}"))
                })?;
                tracing::info!("Migrated subscriptions.{} to {}", legacy, current);
                columns.remove(legacy);
                columns.insert(current.to_string());
            }
        }

        for (column, definition) in ADDED_COLUMNS {
            if !columns.contains(column) {
                conn.execute_batch(&format!(
                    "ALTER TABLE subscriptions ADD COLUMN {column} {definition}"
                ))
                .map_err(|e| {
                    StorageError::Database(format!("failed to add subscriptions.{column}: {e}"))
                })?;
                tracing::info!("Added column subscriptions.{}", column);
            }
        }

        Ok(())
    }

    fn columns(conn: &Connection) -> Result<HashSet<String>> {
        let mut stmt = conn.prepare("PRAGMA table_info(subscriptions)")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(names)
    }

    /// Run `op` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StorageError::Unavailable(format!("Mutex poisoned: {}", e)))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("spawn_blocking: {}", e)))?
    }
}

/// The column holding `current`, under its current or legacy name
fn source_column<'a>(columns: &HashSet<String>, current: &'a str) -> Option<&'a str> {
    if columns.contains(current) {
        return Some(current);
    }
    RENAMED_COLUMNS
        .iter()
        .find(|(_, renamed)| *renamed == current)
        .map(|(legacy, _)| *legacy)
        .filter(|legacy| columns.contains(*legacy))
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubscriptionRecord> {
    Ok(SubscriptionRecord {
        user_id: UserId(row.get(0)?),
        expire_at: row.get(1)?,
        payment_ref: row.get(2)?,
        notified_expiring: row.get::<_, i64>(3)? != 0,
    })
}

fn select_one(conn: &Connection, user_id: UserId) -> Result<Option<SubscriptionRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM subscriptions WHERE user_id = ?1"),
            params![user_id.0],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

fn write_one(conn: &Connection, record: &SubscriptionRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO subscriptions (user_id, expire_at, payment_ref, notified_expiring)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
             expire_at = excluded.expire_at,
             payment_ref = excluded.payment_ref,
             notified_expiring = excluded.notified_expiring",
        params![
            record.user_id.0,
            record.expire_at,
            record.payment_ref,
            record.notified_expiring as i64
        ],
    )?;
    Ok(())
}

fn delete_one(conn: &Connection, user_id: UserId) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM subscriptions WHERE user_id = ?1",
        params![user_id.0],
    )?;
    Ok(removed > 0)
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn get(&self, user_id: UserId) -> Result<Option<SubscriptionRecord>> {
        self.with_conn(move |conn| select_one(conn, user_id)).await
    }

    async fn upsert(&self, record: &SubscriptionRecord) -> Result<()> {
        let record = record.clone();
        self.with_conn(move |conn| write_one(conn, &record)).await
    }

    async fn delete(&self, user_id: UserId) -> Result<bool> {
        self.with_conn(move |conn| delete_one(conn, user_id)).await
    }

    async fn list_all(&self) -> Result<Vec<SubscriptionRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM subscriptions ORDER BY user_id"
            ))?;
            let records = stmt
                .query_map([], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn update(&self, user_id: UserId, f: RecordUpdate) -> Result<Option<SubscriptionRecord>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current = select_one(&tx, user_id)?;
            let next = f(current);
            match &next {
                Some(record) => write_one(&tx, record)?,
                None => {
                    delete_one(&tx, user_id)?;
                }
            }
            tx.commit()?;
            Ok(next)
        })
        .await
    }
}
