use serde_json::{json, Value as JsonValue};

use quill_approvals::{ApprovalError, ApprovalKind, ApprovalRequest};
use quill_provider::{NavigationHint, ProviderError, ProviderEvent, ProviderMethod};

use super::{unexpected, Orchestrator};
use crate::ids::new_request_id;

impl Orchestrator {
    /// Connection-establishing workflow.
    ///
    /// Already-permitted origins get the cached accounts straight back; the
    /// interesting paths are no key material (setup required), a locked
    /// keychain (bounded unlock wait), and the human approval round trip.
    pub(crate) async fn connect(&self, origin: &str) -> Result<JsonValue, ProviderError> {
        if self.connections.has_permission(origin).map_err(unexpected)? {
            return Ok(self.accounts_payload());
        }

        if !self.wallet.has_key_material() {
            // Best effort: route the user to onboarding. The request still
            // fails with a distinguishable setup-required error.
            if let Err(err) = self.surfaces.open(&NavigationHint::new("", "setup")).await {
                log::debug!("setup surface unavailable: {err}");
            }
            return Err(ProviderError::SetupRequired);
        }

        if self.wallet.is_locked() {
            log::debug!("connect from {origin} waiting for unlock");
            self.wallet.await_unlock(self.timeouts.unlock).await?;
        }

        let id = new_request_id();
        let approval = ApprovalRequest::new(
            &id,
            origin,
            ProviderMethod::Connect.as_str(),
            ApprovalKind::Connection,
        );
        // Park the waiter before the surface opens: a UI that resolves the
        // instant it comes up must find the entry in place.
        let pending = match self.approvals.enqueue(approval) {
            Ok(pending) => pending,
            Err(err) => return Err(unexpected(err)),
        };
        if let Err(err) = self.surfaces.open(&NavigationHint::new(&id, "approve-connection")).await
        {
            self.approvals.remove_approval_request(&id);
            return Err(err);
        }
        log::info!("connection approval pending for {origin} ({id})");

        match self.approvals.await_verdict(pending, self.timeouts.approval).await {
            Ok(_) => {
                self.connections.grant(origin).map_err(unexpected)?;
                let accounts: Vec<String> = self.wallet.active_address().into_iter().collect();
                self.publish_page_event(
                    origin,
                    &ProviderEvent::AccountsChanged { accounts: accounts.clone() },
                );
                log::info!("connection granted for {origin}");
                Ok(json!(accounts))
            }
            Err(ApprovalError::Denied | ApprovalError::Dismissed) => {
                Err(ProviderError::user_denied("connect"))
            }
            Err(ApprovalError::TimedOut) => Err(ProviderError::timeout("connection approval")),
            Err(err) => Err(unexpected(err)),
        }
    }

    /// Revoke the grant and tell the page its accounts are gone.
    pub(crate) fn disconnect(&self, origin: &str) -> Result<JsonValue, ProviderError> {
        let had_grant = self.connections.revoke(origin).map_err(unexpected)?;
        self.publish_page_event(origin, &ProviderEvent::AccountsChanged { accounts: Vec::new() });
        self.publish_page_event(origin, &ProviderEvent::Disconnect);
        Ok(json!(had_grant))
    }
}
