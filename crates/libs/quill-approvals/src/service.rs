use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;

use quill_provider::{Origin, RequestId};

/// Bound on a single-step approval (connect, sign).
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Bound on multi-step compose flows, which keep the user in the UI longer.
pub const DEFAULT_COMPOSE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// What the user is being asked to confirm.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ApprovalKind {
    Connection,
    SignMessage,
    Compose,
    Broadcast,
}

/// One unit of work awaiting explicit human confirmation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct ApprovalRequest {
    pub id: RequestId,
    pub origin: Origin,
    pub method: String,
    pub kind: ApprovalKind,
    #[serde(default)]
    pub params: Vec<JsonValue>,
    #[serde(default)]
    pub metadata: BTreeMap<String, JsonValue>,
    pub created_at: i64,
}

impl ApprovalRequest {
    pub fn new(
        id: impl Into<RequestId>,
        origin: impl Into<Origin>,
        method: impl Into<String>,
        kind: ApprovalKind,
    ) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or_default();
        Self {
            id: id.into(),
            origin: origin.into(),
            method: method.into(),
            kind,
            params: Vec::new(),
            metadata: BTreeMap::new(),
            created_at,
        }
    }

    pub fn with_params(mut self, params: Vec<JsonValue>) -> Self {
        self.params = params;
        self
    }
}

/// Failure modes of one approval wait. `TimedOut` is deliberately distinct
/// from `Denied`: an expired prompt is not an explicit user rejection.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ApprovalError {
    #[error("user denied the request")]
    Denied,

    #[error("approval timed out")]
    TimedOut,

    #[error("approval request was dismissed")]
    Dismissed,

    #[error("approval id '{id}' is already pending")]
    DuplicateId { id: RequestId },
}

enum Verdict {
    Approved(JsonValue),
    Denied,
}

/// One parked approval wait, handed out by [`ApprovalService::enqueue`].
///
/// Settle it with [`ApprovalService::await_verdict`]. Dropping it unawaited
/// leaves the queue entry behind; callers that bail out early must dismiss
/// via [`ApprovalService::remove_approval_request`].
pub struct PendingApproval {
    id: RequestId,
    rx: oneshot::Receiver<Verdict>,
}

impl PendingApproval {
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Default)]
struct QueueState {
    queue: Vec<ApprovalRequest>,
    waiters: HashMap<RequestId, oneshot::Sender<Verdict>>,
}

/// Holds pending confirmation requests and settles each waiter exactly once.
///
/// Multiple origins may be pending simultaneously; the service never
/// serializes processing. Only the UI decides how many prompts to show at a
/// time.
#[derive(Default)]
pub struct ApprovalService {
    state: Mutex<QueueState>,
}

impl ApprovalService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Enqueue `request` and park its waiter without awaiting.
    ///
    /// Synchronous so callers can order side effects — opening an approval
    /// surface, say — after the entry is already visible and resolvable. A
    /// UI that resolves the instant it opens must find the waiter in place.
    pub fn enqueue(&self, request: ApprovalRequest) -> Result<PendingApproval, ApprovalError> {
        let id = request.id.clone();
        let mut state = self.state.lock().expect("approval queue poisoned");
        if state.waiters.contains_key(&id) {
            return Err(ApprovalError::DuplicateId { id });
        }
        let (tx, rx) = oneshot::channel();
        state.queue.push(request);
        state.waiters.insert(id.clone(), tx);
        Ok(PendingApproval { id, rx })
    }

    /// Await the verdict for an enqueued approval, bounded by `timeout`.
    ///
    /// Resolves with the approval payload, or rejects with
    /// [`ApprovalError::Denied`], [`ApprovalError::Dismissed`], or
    /// [`ApprovalError::TimedOut`]. Every exit path clears both the queue
    /// entry and the parked waiter — nothing leaks.
    pub async fn await_verdict(
        &self,
        pending: PendingApproval,
        timeout: Duration,
    ) -> Result<JsonValue, ApprovalError> {
        let PendingApproval { id, rx } = pending;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Verdict::Approved(payload))) => Ok(payload),
            Ok(Ok(Verdict::Denied)) => Err(ApprovalError::Denied),
            // Sender dropped without a verdict: the entry was dismissed.
            Ok(Err(_)) => Err(ApprovalError::Dismissed),
            Err(_) => {
                self.discard(&id);
                log::info!("approval {id} timed out");
                Err(ApprovalError::TimedOut)
            }
        }
    }

    /// [`enqueue`](Self::enqueue) and [`await_verdict`](Self::await_verdict)
    /// in one step, for callers with no side effects to order in between.
    pub async fn request_approval(
        &self,
        request: ApprovalRequest,
        timeout: Duration,
    ) -> Result<JsonValue, ApprovalError> {
        let pending = self.enqueue(request)?;
        self.await_verdict(pending, timeout).await
    }

    /// Settle the waiter for `id`. Idempotent: resolving an already-resolved
    /// or unknown id returns `false` and changes nothing.
    pub fn resolve_approval(&self, id: &str, approved: bool, payload: JsonValue) -> bool {
        let sender = {
            let mut state = self.state.lock().expect("approval queue poisoned");
            state.queue.retain(|entry| entry.id != id);
            state.waiters.remove(id)
        };
        let Some(sender) = sender else {
            return false;
        };
        let verdict = if approved { Verdict::Approved(payload) } else { Verdict::Denied };
        // The waiter may already be gone (timed out between our lock and its
        // cleanup); that race settles as a no-op.
        let _ = sender.send(verdict);
        true
    }

    /// Manually dismiss a pending request. Its waiter rejects with
    /// [`ApprovalError::Dismissed`]. Returns whether anything was removed.
    pub fn remove_approval_request(&self, id: &str) -> bool {
        let mut state = self.state.lock().expect("approval queue poisoned");
        let before = state.queue.len();
        state.queue.retain(|entry| entry.id != id);
        let had_waiter = state.waiters.remove(id).is_some();
        had_waiter || state.queue.len() != before
    }

    /// Pending requests, oldest first.
    pub fn approval_queue(&self) -> Vec<ApprovalRequest> {
        self.state.lock().expect("approval queue poisoned").queue.clone()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.state.lock().expect("approval queue poisoned").waiters.contains_key(id)
    }

    fn discard(&self, id: &str) {
        let mut state = self.state.lock().expect("approval queue poisoned");
        state.queue.retain(|entry| entry.id != id);
        state.waiters.remove(id);
    }
}
