use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

use quill_provider::{Origin, RequestId};

use crate::db::{now_ms, StateDb, StateError};

/// How long unconsumed handoff records stay around before pruning.
pub const DEFAULT_HANDOFF_TTL: Duration = Duration::from_secs(10 * 60);

/// Parameters of one sensitive request, parked for the approval UI.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HandoffRecord {
    pub request_id: RequestId,
    pub origin: Origin,
    pub method: String,
    pub params: Vec<JsonValue>,
    pub created_at: i64,
}

/// Short-lived store carrying compose/sign parameters across the
/// background→UI boundary, keyed by generated request id.
///
/// Records are consumed on first [`take`](Self::take); anything the UI never
/// picked up is pruned after the TTL.
pub struct HandoffStore {
    db: Arc<StateDb>,
}

impl HandoffStore {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self { db }
    }

    pub fn put(
        &self,
        request_id: &str,
        origin: &str,
        method: &str,
        params: &[JsonValue],
    ) -> Result<(), StateError> {
        let encoded = serde_json::to_string(params)?;
        let created_at = now_ms();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO handoff_records
                 (request_id, origin, method, params, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![request_id, origin, method, encoded, created_at],
            )
        })?;
        Ok(())
    }

    /// Consume the record for `request_id`, removing it.
    pub fn take(&self, request_id: &str) -> Result<Option<HandoffRecord>, StateError> {
        let row: Option<(String, String, String, i64)> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT origin, method, params, created_at
                 FROM handoff_records WHERE request_id = ?1",
                params![request_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
        })?;

        let Some((origin, method, encoded, created_at)) = row else {
            return Ok(None);
        };
        self.remove(request_id)?;

        let params: Vec<JsonValue> = serde_json::from_str(&encoded)?;
        Ok(Some(HandoffRecord {
            request_id: request_id.to_string(),
            origin,
            method,
            params,
            created_at,
        }))
    }

    /// Drop the record for `request_id` without reading it. Idempotent.
    pub fn remove(&self, request_id: &str) -> Result<bool, StateError> {
        let removed = self.db.with_conn(|conn| {
            conn.execute("DELETE FROM handoff_records WHERE request_id = ?1", params![request_id])
        })?;
        Ok(removed > 0)
    }

    /// Prune records older than `ttl`. Returns how many were removed.
    pub fn prune_expired(&self, ttl: Duration) -> Result<usize, StateError> {
        let cutoff = now_ms().saturating_sub(ttl.as_millis() as i64);
        let pruned = self.db.with_conn(|conn| {
            conn.execute("DELETE FROM handoff_records WHERE created_at <= ?1", params![cutoff])
        })?;
        if pruned > 0 {
            log::debug!("pruned {pruned} expired handoff records");
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> HandoffStore {
        HandoffStore::new(StateDb::in_memory().expect("db"))
    }

    #[test]
    fn take_consumes_the_record() {
        let store = store();
        store
            .put("req-1", "https://dapp.example", "compose_send", &[json!({ "amount": 5 })])
            .expect("put");

        let record = store.take("req-1").expect("take").expect("present");
        assert_eq!(record.origin, "https://dapp.example");
        assert_eq!(record.params, vec![json!({ "amount": 5 })]);

        assert_eq!(store.take("req-1").expect("take again"), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let store = store();
        store.put("req-2", "https://dapp.example", "sign_message", &[]).expect("put");
        assert!(store.remove("req-2").expect("remove"));
        assert!(!store.remove("req-2").expect("remove again"));
    }

    #[test]
    fn prune_expired_drops_old_records_only() {
        let store = store();
        store.put("req-3", "https://dapp.example", "sign_message", &[]).expect("put");
        // TTL longer than the record's age keeps it.
        assert_eq!(store.prune_expired(Duration::from_secs(600)).expect("prune"), 0);
        // Zero TTL makes everything expired.
        assert_eq!(store.prune_expired(Duration::ZERO).expect("prune"), 1);
        assert_eq!(store.take("req-3").expect("take"), None);
    }
}
