use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Errors from the durable stores.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StateError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One SQLite connection shared by the persisted stores.
///
/// Writes are synchronous in-memory SQLite operations; the connection sits
/// behind a mutex so stores can be called from any task.
pub struct StateDb {
    conn: Mutex<Connection>,
}

impl StateDb {
    pub fn in_memory() -> Result<Arc<Self>, StateError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(Arc::new(db))
    }

    pub fn open(path: &Path) -> Result<Arc<Self>, StateError> {
        let conn = Connection::open(path)?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(Arc::new(db))
    }

    fn init_schema(&self) -> Result<(), StateError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS grants (
                    origin TEXT PRIMARY KEY,
                    granted_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS replay_records (
                    fingerprint TEXT PRIMARY KEY,
                    origin TEXT NOT NULL,
                    method TEXT NOT NULL,
                    status TEXT NOT NULL,
                    first_seen_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS handoff_records (
                    request_id TEXT PRIMARY KEY,
                    origin TEXT NOT NULL,
                    method TEXT NOT NULL,
                    params TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );",
            )
        })?;
        Ok(())
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StateError> {
        let conn = self.conn.lock().expect("state db mutex poisoned");
        Ok(f(&conn)?)
    }
}

/// Milliseconds since the unix epoch.
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
