use serde_json::{json, Value as JsonValue};

use quill_provider::{NavigationHint, ProviderError, ProviderMethod, ProviderRequest};
use quill_state::fingerprint;

use super::{ui_cancel_topic, ui_complete_topic, unexpected, Orchestrator};
use crate::ids::new_request_id;

/// Lifecycle of one sensitive operation. Completion and cancellation are
/// mutually exclusive; whichever event fires first wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OperationPhase {
    Created,
    AwaitingUi,
    Completed,
    Cancelled,
    TimedOut,
}

impl OperationPhase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AwaitingUi => "awaiting-ui",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed-out",
        }
    }
}

impl Orchestrator {
    /// Signing/compose workflow.
    ///
    /// Parameters are parked in the handoff store under a fresh request id,
    /// the id is registered as a critical operation (guard drop clears it on
    /// every exit path), and the result arrives as a UI completion or
    /// cancellation event scoped to that id — or not at all, bounded by the
    /// flow's timeout. Both event subscriptions are taken before the surface
    /// opens so nothing can fire into the void; the `select!` drops the
    /// losing subscription, deregistering it.
    pub(crate) async fn sensitive_operation(
        &self,
        method: ProviderMethod,
        request: &ProviderRequest,
    ) -> Result<JsonValue, ProviderError> {
        self.require_permission(&request.origin)?;

        let id = new_request_id();
        self.handoff
            .put(&id, &request.origin, method.as_str(), &request.params)
            .map_err(unexpected)?;
        let _critical = self.critical.guard(&id);
        self.log_phase(method, &id, OperationPhase::Created);

        let mut complete = self.bus.subscribe(&ui_complete_topic(method, &id));
        let mut cancel = self.bus.subscribe(&ui_cancel_topic(method, &id));

        let route = match method {
            ProviderMethod::SignMessage => "sign-message",
            _ => "compose",
        };
        if let Err(err) = self.surfaces.open(&NavigationHint::new(&id, route)).await {
            let _ = self.handoff.remove(&id);
            return Err(err);
        }
        self.log_phase(method, &id, OperationPhase::AwaitingUi);

        let timeout = if method == ProviderMethod::ComposeSend {
            self.timeouts.compose
        } else {
            self.timeouts.approval
        };

        let outcome = tokio::select! {
            payload = complete.recv() => match payload {
                Ok(payload) => {
                    self.log_phase(method, &id, OperationPhase::Completed);
                    Ok(payload)
                }
                Err(err) => Err(unexpected(err)),
            },
            cancelled = cancel.recv() => match cancelled {
                Ok(_) => {
                    self.log_phase(method, &id, OperationPhase::Cancelled);
                    Err(ProviderError::user_denied(method.as_str()))
                }
                Err(err) => Err(unexpected(err)),
            },
            () = tokio::time::sleep(timeout) => {
                self.log_phase(method, &id, OperationPhase::TimedOut);
                Err(ProviderError::timeout(method.as_str()))
            }
        };

        // The UI consumes the handoff on the happy path; anything else must
        // not leave parameters lying around.
        if outcome.is_err() {
            let _ = self.handoff.remove(&id);
        }
        outcome
    }

    /// Broadcast an already-signed payload, with the replay ledger consulted
    /// before any network contact and the pending record written before
    /// submission to close the decision/acknowledgment race.
    pub(crate) async fn broadcast(
        &self,
        request: &ProviderRequest,
    ) -> Result<JsonValue, ProviderError> {
        self.require_permission(&request.origin)?;

        let signed_hex = request
            .params
            .first()
            .and_then(JsonValue::as_str)
            .filter(|hex| !hex.is_empty() && hex.len() % 2 == 0)
            .filter(|hex| hex.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| {
                ProviderError::validation("broadcast_transaction expects a signed transaction hex")
            })?;

        let method = ProviderMethod::BroadcastTransaction;
        let verdict = self
            .replay
            .check_replay_attempt(&request.origin, method.as_str(), &request.params)
            .map_err(unexpected)?;
        if verdict.is_replay {
            let reason = verdict.reason.unwrap_or_else(|| "duplicate submission".to_string());
            log::warn!("replay rejected for {}: {reason}", request.origin);
            return Err(ProviderError::Replay { reason });
        }

        let fp = fingerprint(method.as_str(), &request.params);
        self.replay
            .record_pending(&fp, &request.origin, method.as_str())
            .map_err(unexpected)?;

        let id = new_request_id();
        let _critical = self.critical.guard(&id);

        // A network failure leaves the pending row behind; it blocks
        // immediate resubmission and is evicted after the grace period.
        let txid = self.wallet.broadcast_transaction(signed_hex).await?;
        self.replay.mark_broadcasted(&fp).map_err(unexpected)?;
        log::info!("broadcast accepted for {}: {txid}", request.origin);
        Ok(json!({ "txid": txid }))
    }

    fn log_phase(&self, method: ProviderMethod, id: &str, phase: OperationPhase) {
        log::debug!("{} {id}: {}", method.as_str(), phase.as_str());
    }
}
