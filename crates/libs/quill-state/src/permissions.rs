use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use quill_provider::Origin;

use crate::db::{now_ms, StateDb, StateError};

/// One persisted connection permission.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConnectionGrant {
    pub origin: Origin,
    pub granted_at: i64,
}

/// The persisted origin allow-list.
///
/// An origin either has a grant or it does not; grants carry no implicit
/// expiry and are removed only by explicit revocation. The page-facing
/// disconnect event is the orchestrator's job, not the store's.
pub struct ConnectionStore {
    db: Arc<StateDb>,
}

impl ConnectionStore {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self { db }
    }

    pub fn has_permission(&self, origin: &str) -> Result<bool, StateError> {
        let found: Option<i64> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT granted_at FROM grants WHERE origin = ?1",
                params![origin],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(found.is_some())
    }

    /// Persist a grant for `origin`. Idempotent; re-granting keeps the
    /// original timestamp.
    pub fn grant(&self, origin: &str) -> Result<(), StateError> {
        let granted_at = now_ms();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO grants (origin, granted_at) VALUES (?1, ?2)",
                params![origin, granted_at],
            )
        })?;
        log::debug!("connection grant recorded for {origin}");
        Ok(())
    }

    /// Remove the grant for `origin`. Idempotent; returns whether a grant
    /// existed.
    pub fn revoke(&self, origin: &str) -> Result<bool, StateError> {
        let removed = self
            .db
            .with_conn(|conn| conn.execute("DELETE FROM grants WHERE origin = ?1", params![origin]))?;
        if removed > 0 {
            log::debug!("connection grant revoked for {origin}");
        }
        Ok(removed > 0)
    }

    /// All grants, oldest first.
    pub fn grants(&self) -> Result<Vec<ConnectionGrant>, StateError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT origin, granted_at FROM grants ORDER BY granted_at ASC, origin ASC")?;
            let rows = stmt.query_map([], |row| {
                Ok(ConnectionGrant { origin: row.get(0)?, granted_at: row.get(1)? })
            })?;
            rows.collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConnectionStore {
        ConnectionStore::new(StateDb::in_memory().expect("db"))
    }

    #[test]
    fn grant_then_has_permission() {
        let store = store();
        assert!(!store.has_permission("https://dapp.example").expect("query"));
        store.grant("https://dapp.example").expect("grant");
        assert!(store.has_permission("https://dapp.example").expect("query"));
    }

    #[test]
    fn grant_is_idempotent() {
        let store = store();
        store.grant("https://dapp.example").expect("grant");
        store.grant("https://dapp.example").expect("grant again");
        let grants = store.grants().expect("list");
        assert_eq!(grants.len(), 1);
    }

    #[test]
    fn revoke_is_idempotent_and_reports_presence() {
        let store = store();
        store.grant("https://dapp.example").expect("grant");
        assert!(store.revoke("https://dapp.example").expect("revoke"));
        assert!(!store.revoke("https://dapp.example").expect("revoke again"));
        assert!(!store.has_permission("https://dapp.example").expect("query"));
    }

    #[test]
    fn grants_survive_reopen() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        {
            let db = StateDb::open(file.path()).expect("open");
            ConnectionStore::new(db).grant("https://dapp.example").expect("grant");
        }
        let db = StateDb::open(file.path()).expect("reopen");
        assert!(ConnectionStore::new(db).has_permission("https://dapp.example").expect("query"));
    }
}
