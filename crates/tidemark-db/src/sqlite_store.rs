use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use tidemark_common::{Error, Result};
use tidemark_config::model::validate_collection_name;
use tracing::{debug, info};

use crate::control::{ControlRecord, ControlStore, check_channel, control_id};

/// How long a connection waits on another process's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed control store. Several processes may open the same file;
/// the lock protocol relies only on SQLite's single-statement atomicity.
pub struct SqliteControlStore {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteControlStore {
    pub fn open(db_path: &Path, collection_name: &str) -> Result<Self> {
        info!("opening control store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;
        Self::init(conn, collection_name)
    }

    pub fn in_memory(collection_name: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::init(conn, collection_name)
    }

    fn init(conn: Connection, collection_name: &str) -> Result<Self> {
        validate_collection_name(collection_name)?;

        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| Error::Database(format!("failed to set busy timeout: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
            table: collection_name.to_string(),
        };
        store.create_table()?;
        Ok(store)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("control store lock poisoned".into()))
    }

    fn create_table(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS [{table}] (
                id TEXT PRIMARY KEY,
                channel TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                locked INTEGER NOT NULL DEFAULT 0,
                locked_at TEXT
            );",
            table = self.table
        ))
        .map_err(|e| Error::Database(format!("failed to create control table: {e}")))?;
        Ok(())
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT id, channel, version, locked, locked_at FROM [{}]",
            self.table
        )
    }
}

impl ControlStore for SqliteControlStore {
    fn read_or_create(&self, channel: &str) -> Result<ControlRecord> {
        check_channel(channel)?;
        let id = control_id(channel);
        let conn = self.connection()?;

        let inserted = conn
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO [{}] (id, channel, version, locked) VALUES (?1, ?2, 0, 0)",
                    self.table
                ),
                params![id, channel],
            )
            .map_err(|e| Error::Database(format!("failed to create control record: {e}")))?;
        if inserted == 1 {
            debug!("created control record {id}");
        }

        let raw = conn
            .query_row(
                &format!("{} WHERE id = ?1", self.select_sql()),
                params![id],
                RawRecord::from_row,
            )
            .map_err(|e| Error::Database(format!("failed to read control record: {e}")))?;
        raw.decode()
    }

    fn conditional_lock(&self, channel: &str) -> Result<bool> {
        check_channel(channel)?;
        let conn = self.connection()?;
        // One statement: the WHERE clause is the compare, the SET is the swap.
        let changed = conn
            .execute(
                &format!(
                    "UPDATE [{}] SET locked = 1, locked_at = ?2 WHERE id = ?1 AND locked = 0",
                    self.table
                ),
                params![control_id(channel), Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::Database(format!("failed to lock control record: {e}")))?;
        Ok(changed == 1)
    }

    fn commit(&self, channel: &str, version: u32, locked: bool) -> Result<()> {
        check_channel(channel)?;
        let conn = self.connection()?;
        conn.execute(
            &format!(
                "INSERT INTO [{}] (id, channel, version, locked) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET version = excluded.version, locked = excluded.locked",
                self.table
            ),
            params![control_id(channel), channel, i64::from(version), locked],
        )
        .map_err(|e| Error::Database(format!("failed to write control record: {e}")))?;
        Ok(())
    }

    fn force_unlock(&self, channel: &str) -> Result<()> {
        check_channel(channel)?;
        let conn = self.connection()?;
        conn.execute(
            &format!("UPDATE [{}] SET locked = 0 WHERE id = ?1", self.table),
            params![control_id(channel)],
        )
        .map_err(|e| Error::Database(format!("failed to unlock control record: {e}")))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<ControlRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!("{} ORDER BY channel ASC", self.select_sql()))
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], RawRecord::from_row)
            .map_err(|e| Error::Database(format!("failed to query control records: {e}")))?;

        let mut records = Vec::new();
        for row in rows {
            let raw =
                row.map_err(|e| Error::Database(format!("failed to read control row: {e}")))?;
            records.push(raw.decode()?);
        }
        Ok(records)
    }

    fn reset(&self) -> Result<()> {
        let conn = self.connection()?;
        let removed = conn
            .execute(&format!("DELETE FROM [{}]", self.table), [])
            .map_err(|e| Error::Database(format!("failed to reset control records: {e}")))?;
        info!("removed {removed} control record(s)");
        Ok(())
    }
}

/// Row as stored, before the strict field checks.
struct RawRecord {
    id: String,
    channel: String,
    version: i64,
    locked: i64,
    locked_at: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            channel: row.get(1)?,
            version: row.get(2)?,
            locked: row.get(3)?,
            locked_at: row.get(4)?,
        })
    }

    fn decode(self) -> Result<ControlRecord> {
        let version = u32::try_from(self.version).map_err(|_| {
            Error::InvalidControlRecord(format!(
                "{} has out-of-range version {}",
                self.id, self.version
            ))
        })?;
        let locked = match self.locked {
            0 => false,
            1 => true,
            other => {
                return Err(Error::InvalidControlRecord(format!(
                    "{} has non-boolean locked value {other}",
                    self.id
                )));
            }
        };

        Ok(ControlRecord {
            id: self.id,
            channel: self.channel,
            version,
            locked,
            locked_at: self.locked_at.as_deref().and_then(parse_datetime),
        })
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
