mod connection;
mod sensitive;

use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use quill_approvals::{ApprovalService, CriticalOperationRegistry};
use quill_bus::MessageBus;
use quill_provider::{
    AnalyticsSink, MethodClass, ProviderError, ProviderEvent, ProviderMethod, ProviderRequest,
    WalletService,
};
use quill_state::{
    ConnectionStore, HandoffRecord, HandoffStore, RateLimiter, ReplayLedger, StateDb,
};

use crate::config::BrokerConfig;
use crate::ui::SurfaceOpener;

/// Timeout set for one broker instance, resolved from config.
#[derive(Clone, Copy, Debug)]
pub struct Timeouts {
    pub approval: Duration,
    pub compose: Duration,
    pub unlock: Duration,
}

/// Sole entry point for page requests.
///
/// Validates, rate-limits, classifies, and dispatches every request,
/// composing the permission store, the rate limiters, the replay ledger,
/// the approval service, and the critical-operation registry into
/// per-method workflows.
pub struct Orchestrator {
    bus: Arc<MessageBus>,
    wallet: Arc<dyn WalletService>,
    analytics: Arc<dyn AnalyticsSink>,
    approvals: Arc<ApprovalService>,
    critical: Arc<CriticalOperationRegistry>,
    connections: ConnectionStore,
    replay: ReplayLedger,
    handoff: HandoffStore,
    connection_limiter: RateLimiter,
    transaction_limiter: RateLimiter,
    general_limiter: RateLimiter,
    surfaces: SurfaceOpener,
    timeouts: Timeouts,
    max_params_bytes: usize,
}

impl Orchestrator {
    pub fn new(
        bus: Arc<MessageBus>,
        db: Arc<StateDb>,
        wallet: Arc<dyn WalletService>,
        analytics: Arc<dyn AnalyticsSink>,
        surfaces: SurfaceOpener,
        config: &BrokerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            wallet,
            analytics,
            approvals: ApprovalService::new(),
            critical: CriticalOperationRegistry::new(),
            connections: ConnectionStore::new(Arc::clone(&db)),
            replay: ReplayLedger::new(Arc::clone(&db)),
            handoff: HandoffStore::new(db),
            connection_limiter: RateLimiter::new(config.limits.connection()),
            transaction_limiter: RateLimiter::new(config.limits.transaction()),
            general_limiter: RateLimiter::new(config.limits.general()),
            surfaces,
            timeouts: Timeouts {
                approval: config.timeouts.approval(),
                compose: config.timeouts.compose(),
                unlock: config.timeouts.unlock(),
            },
            max_params_bytes: config.limits.max_params_bytes,
        })
    }

    /// The approval service, for the UI's resolve channel and for tests.
    pub fn approvals(&self) -> &Arc<ApprovalService> {
        &self.approvals
    }

    /// The critical-operation gate the update manager consults.
    pub fn critical_operations(&self) -> &Arc<CriticalOperationRegistry> {
        &self.critical
    }

    /// The replay ledger, for maintenance (stale-pending eviction).
    pub fn replay_ledger(&self) -> &ReplayLedger {
        &self.replay
    }

    /// The handoff store, for maintenance (TTL pruning).
    pub fn handoff_store(&self) -> &HandoffStore {
        &self.handoff
    }

    /// Consume the parked parameters for a sensitive request (UI side).
    pub fn take_handoff(&self, request_id: &str) -> Result<Option<HandoffRecord>, ProviderError> {
        self.handoff.take(request_id).map_err(unexpected)
    }

    /// Handle one page request end to end.
    pub async fn handle_request(&self, request: ProviderRequest) -> Result<JsonValue, ProviderError> {
        self.analytics.record_request(&request.method);
        let outcome = self.dispatch(&request).await;
        let code = match &outcome {
            Ok(_) => "ok",
            Err(err) => err.code(),
        };
        self.analytics.record_outcome(&request.method, code);
        outcome
    }

    async fn dispatch(&self, request: &ProviderRequest) -> Result<JsonValue, ProviderError> {
        // Oversized payloads are rejected before any other work. Metadata is
        // page-supplied just like params, so both count against the cap.
        let encoded_len = serde_json::to_vec(&request.params)
            .map(|bytes| bytes.len())
            .map_err(unexpected)?
            + serde_json::to_vec(&request.metadata)
                .map(|bytes| bytes.len())
                .map_err(unexpected)?;
        if encoded_len > self.max_params_bytes {
            return Err(ProviderError::validation(format!(
                "request payload of {encoded_len} bytes exceeds the {} byte cap",
                self.max_params_bytes
            )));
        }

        let method: ProviderMethod = request
            .method
            .parse()
            .map_err(|()| ProviderError::unsupported(request.method.clone()))?;

        let limiter = self.limiter_for(method.class());
        if !limiter.is_allowed(&request.origin) {
            let retry_after_ms = limiter.reset_in(&request.origin).as_millis() as u64;
            log::debug!("rate limited {} for {}", request.method, request.origin);
            return Err(ProviderError::RateLimited { retry_after_ms: retry_after_ms.max(1) });
        }

        match method {
            ProviderMethod::ChainId => Ok(json!(self.wallet.chain_id())),
            ProviderMethod::IsConnected => {
                let connected =
                    self.connections.has_permission(&request.origin).map_err(unexpected)?;
                Ok(json!(connected))
            }
            ProviderMethod::Accounts => {
                self.require_permission(&request.origin)?;
                Ok(self.accounts_payload())
            }
            ProviderMethod::Connect => self.connect(&request.origin).await,
            ProviderMethod::Disconnect => self.disconnect(&request.origin),
            ProviderMethod::SignMessage | ProviderMethod::ComposeSend => {
                self.sensitive_operation(method, request).await
            }
            ProviderMethod::BroadcastTransaction => self.broadcast(request).await,
        }
    }

    fn limiter_for(&self, class: MethodClass) -> &RateLimiter {
        match class {
            MethodClass::Connection => &self.connection_limiter,
            MethodClass::Transaction => &self.transaction_limiter,
            MethodClass::General => &self.general_limiter,
        }
    }

    fn require_permission(&self, origin: &str) -> Result<(), ProviderError> {
        if self.connections.has_permission(origin).map_err(unexpected)? {
            Ok(())
        } else {
            Err(ProviderError::Permission { origin: origin.to_string() })
        }
    }

    fn accounts_payload(&self) -> JsonValue {
        let accounts: Vec<String> = self.wallet.active_address().into_iter().collect();
        json!(accounts)
    }

    pub(crate) fn publish_page_event(&self, origin: &str, event: &ProviderEvent) {
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(err) => {
                log::error!("failed to encode page event: {err}");
                return;
            }
        };
        self.bus.publish(&page_topic(origin), payload);
    }
}

/// Topic carrying provider events for one origin's page context.
pub fn page_topic(origin: &str) -> String {
    format!("page:{origin}")
}

/// Topic the UI publishes when it completes a sensitive request.
pub fn ui_complete_topic(method: ProviderMethod, request_id: &str) -> String {
    format!("{}-complete-{request_id}", method.as_str())
}

/// Topic the UI publishes when the user cancels a sensitive request.
pub fn ui_cancel_topic(method: ProviderMethod, request_id: &str) -> String {
    format!("{}-cancel-{request_id}", method.as_str())
}

/// Tag-and-rethrow for errors no workflow anticipated. Never masked: the
/// caller still receives a definitive rejection carrying the original text.
pub(crate) fn unexpected(err: impl fmt::Display) -> ProviderError {
    log::error!("unexpected broker error: {err}");
    ProviderError::internal(err.to_string())
}
