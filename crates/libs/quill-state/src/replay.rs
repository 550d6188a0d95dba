use rusqlite::{params, OptionalExtension};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::db::{now_ms, StateDb, StateError};

/// How long a `pending` record blocks resubmission from the same origin.
pub const DEFAULT_PENDING_WINDOW: Duration = Duration::from_secs(30);

/// Grace period before a stale pending record (crash before confirmation)
/// becomes evictable. Broadcasted records are never evicted.
pub const DEFAULT_EVICTION_GRACE: Duration = Duration::from_secs(60 * 60);

/// Lifecycle of one fingerprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayStatus {
    /// Recorded before network submission; the race window is closed but the
    /// network has not acknowledged yet.
    Pending,
    /// Acknowledged by the network. Terminal; resubmission is permanently
    /// rejected.
    Broadcasted,
}

impl ReplayStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Broadcasted => "broadcasted",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "broadcasted" => Some(Self::Broadcasted),
            _ => None,
        }
    }
}

/// Outcome of a replay check.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayVerdict {
    pub is_replay: bool,
    pub reason: Option<String>,
}

impl ReplayVerdict {
    fn allowed() -> Self {
        Self { is_replay: false, reason: None }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self { is_replay: true, reason: Some(reason.into()) }
    }
}

/// Deterministic digest of a request's semantic content.
///
/// Object keys are sorted recursively before hashing so two params values
/// that differ only in key order produce the same fingerprint.
pub fn fingerprint(method: &str, params: &[JsonValue]) -> String {
    let normalized: Vec<JsonValue> = params.iter().map(canonicalize).collect();
    let payload = serde_json::to_vec(&normalized).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

fn canonicalize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<(&String, &JsonValue)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut normalized = serde_json::Map::new();
            for (key, inner) in entries {
                normalized.insert(key.clone(), canonicalize(inner));
            }
            JsonValue::Object(normalized)
        }
        JsonValue::Array(values) => JsonValue::Array(values.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Fingerprint-keyed record of signed/broadcast payloads.
pub struct ReplayLedger {
    db: Arc<StateDb>,
    pending_window: Duration,
}

impl ReplayLedger {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self::with_pending_window(db, DEFAULT_PENDING_WINDOW)
    }

    pub fn with_pending_window(db: Arc<StateDb>, pending_window: Duration) -> Self {
        Self { db, pending_window }
    }

    /// Decide whether this submission is a replay of something already seen.
    pub fn check_replay_attempt(
        &self,
        origin: &str,
        method: &str,
        params: &[JsonValue],
    ) -> Result<ReplayVerdict, StateError> {
        self.check_at(origin, &fingerprint(method, params), now_ms())
    }

    fn check_at(&self, origin: &str, fp: &str, now: i64) -> Result<ReplayVerdict, StateError> {
        let row: Option<(String, String, i64)> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT origin, status, first_seen_at FROM replay_records WHERE fingerprint = ?1",
                params![fp],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
        })?;

        let Some((recorded_origin, status, first_seen_at)) = row else {
            return Ok(ReplayVerdict::allowed());
        };

        match ReplayStatus::parse(&status) {
            Some(ReplayStatus::Broadcasted) => {
                Ok(ReplayVerdict::rejected("payload already broadcast"))
            }
            Some(ReplayStatus::Pending) => {
                let window_ms = self.pending_window.as_millis() as i64;
                if recorded_origin == origin && now.saturating_sub(first_seen_at) <= window_ms {
                    Ok(ReplayVerdict::rejected("identical submission already in flight"))
                } else {
                    Ok(ReplayVerdict::allowed())
                }
            }
            None => Ok(ReplayVerdict::rejected(format!("unknown ledger status '{status}'"))),
        }
    }

    /// Record a pending submission **before** network contact, closing the
    /// race between decision and acknowledgment. Re-recording an evictable
    /// pending fingerprint refreshes it.
    pub fn record_pending(
        &self,
        fp: &str,
        origin: &str,
        method: &str,
    ) -> Result<(), StateError> {
        let first_seen_at = now_ms();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO replay_records
                 (fingerprint, origin, method, status, first_seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![fp, origin, method, ReplayStatus::Pending.as_str(), first_seen_at],
            )
        })?;
        Ok(())
    }

    /// Transition a pending fingerprint to its terminal state. Returns
    /// whether a record existed.
    pub fn mark_broadcasted(&self, fp: &str) -> Result<bool, StateError> {
        let updated = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE replay_records SET status = ?1 WHERE fingerprint = ?2",
                params![ReplayStatus::Broadcasted.as_str(), fp],
            )
        })?;
        Ok(updated > 0)
    }

    /// Current status of a fingerprint, if recorded.
    pub fn status(&self, fp: &str) -> Result<Option<ReplayStatus>, StateError> {
        let status: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT status FROM replay_records WHERE fingerprint = ?1",
                params![fp],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(status.as_deref().and_then(ReplayStatus::parse))
    }

    /// Remove pending records older than `grace` (a crash before network
    /// confirmation leaves them behind). Returns how many were evicted.
    pub fn evict_stale_pending(&self, grace: Duration) -> Result<usize, StateError> {
        let cutoff = now_ms().saturating_sub(grace.as_millis() as i64);
        let evicted = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM replay_records WHERE status = ?1 AND first_seen_at <= ?2",
                params![ReplayStatus::Pending.as_str(), cutoff],
            )
        })?;
        if evicted > 0 {
            log::debug!("evicted {evicted} stale pending replay records");
        }
        Ok(evicted)
    }
}
