//! SQLite ledger of indexed chunk keys, used for incremental re-indexing.
//!
//! Each row records a content key, the namespace (one per collection), the group the key
//! belongs to (the chunk's source file) and when it was last written. Re-indexing a group
//! refreshes the keys it still produces; keys left with an older timestamp are stale.

use rusqlite::{Connection, params, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS upsertion_record (
    uuid TEXT PRIMARY KEY,
    key TEXT NOT NULL,
    namespace TEXT NOT NULL,
    group_id TEXT,
    updated_at REAL NOT NULL,
    UNIQUE (key, namespace)
);
CREATE INDEX IF NOT EXISTS ix_upsertion_record_group ON upsertion_record (namespace, group_id);
CREATE INDEX IF NOT EXISTS ix_upsertion_record_updated ON upsertion_record (namespace, updated_at);
";

/// Errors raised by the record ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// SQLite reported an error.
    #[error("record ledger error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The directory holding the ledger file could not be created.
    #[error("failed to create ledger directory {path}: {source}")]
    Io {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// A previous holder of the connection panicked.
    #[error("record ledger connection lock poisoned")]
    Poisoned,
    /// Keys and group ids were not supplied pairwise.
    #[error("expected {expected} group ids, got {actual}")]
    LengthMismatch {
        /// Number of keys.
        expected: usize,
        /// Number of group ids.
        actual: usize,
    },
}

/// Namespaced key ledger backed by a single SQLite connection.
pub struct RecordLedger {
    conn: Mutex<Connection>,
    namespace: String,
}

impl RecordLedger {
    /// Open (or create) the ledger file and ensure the schema exists.
    pub fn open(path: &Path, namespace: impl Into<String>) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let ledger = Self {
            conn: Mutex::new(Connection::open(path)?),
            namespace: namespace.into(),
        };
        ledger.create_schema()?;
        tracing::debug!(path = %path.display(), namespace = %ledger.namespace, "Opened record ledger");
        Ok(ledger)
    }

    /// In-memory ledger, mainly for tests and dry runs.
    pub fn in_memory(namespace: impl Into<String>) -> Result<Self, LedgerError> {
        let ledger = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            namespace: namespace.into(),
        };
        ledger.create_schema()?;
        Ok(ledger)
    }

    /// Namespace all operations are scoped to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Create the ledger table and indexes if they are missing.
    pub fn create_schema(&self) -> Result<(), LedgerError> {
        self.with_conn(|conn| Ok(conn.execute_batch(SCHEMA)?))
    }

    /// Seconds since the Unix epoch, as stored in `updated_at`.
    pub fn now() -> f64 {
        time::OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
    }

    /// Report which of `keys` are already recorded.
    pub fn exists(&self, keys: &[String]) -> Result<Vec<bool>, LedgerError> {
        self.with_conn(|conn| {
            let mut statement = conn.prepare_cached(
                "SELECT 1 FROM upsertion_record WHERE namespace = ?1 AND key = ?2",
            )?;
            keys.iter()
                .map(|key| {
                    statement
                        .exists(params![self.namespace, key])
                        .map_err(LedgerError::from)
                })
                .collect()
        })
    }

    /// Insert or refresh `keys` with their group ids at time `at`.
    pub fn update(
        &self,
        keys: &[String],
        group_ids: &[Option<String>],
        at: f64,
    ) -> Result<(), LedgerError> {
        if keys.len() != group_ids.len() {
            return Err(LedgerError::LengthMismatch {
                expected: keys.len(),
                actual: group_ids.len(),
            });
        }
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut statement = tx.prepare_cached(
                    "INSERT INTO upsertion_record (uuid, key, namespace, group_id, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (key, namespace)
                     DO UPDATE SET group_id = excluded.group_id, updated_at = excluded.updated_at",
                )?;
                for (key, group_id) in keys.iter().zip(group_ids) {
                    statement.execute(params![
                        uuid::Uuid::new_v4().to_string(),
                        key,
                        self.namespace,
                        group_id,
                        at
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Keys in any of `group_ids` last written strictly before `before`.
    pub fn list_keys(&self, group_ids: &[String], before: f64) -> Result<Vec<String>, LedgerError> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let placeholders = vec!["?"; group_ids.len()].join(", ");
            let sql = format!(
                "SELECT key FROM upsertion_record
                 WHERE namespace = ? AND updated_at < ? AND group_id IN ({placeholders})
                 ORDER BY key"
            );
            let mut values: Vec<rusqlite::types::Value> = vec![
                self.namespace.clone().into(),
                before.into(),
            ];
            values.extend(group_ids.iter().cloned().map(Into::into));
            let mut statement = conn.prepare(&sql)?;
            let rows = statement.query_map(params_from_iter(values), |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<String>, _>>()?)
        })
    }

    /// Every key recorded in this namespace.
    pub fn all_keys(&self) -> Result<Vec<String>, LedgerError> {
        self.with_conn(|conn| {
            let mut statement = conn
                .prepare_cached("SELECT key FROM upsertion_record WHERE namespace = ?1 ORDER BY key")?;
            let rows = statement.query_map(params![self.namespace], |row| row.get(0))?;
            Ok(rows.collect::<Result<Vec<String>, _>>()?)
        })
    }

    /// Remove `keys` from this namespace.
    pub fn delete_keys(&self, keys: &[String]) -> Result<(), LedgerError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut statement = tx.prepare_cached(
                    "DELETE FROM upsertion_record WHERE namespace = ?1 AND key = ?2",
                )?;
                for key in keys {
                    statement.execute(params![self.namespace, key])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        f(&mut conn)
    }
}

impl std::fmt::Debug for RecordLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordLedger")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
