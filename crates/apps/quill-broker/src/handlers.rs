use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

use quill_bus::{BusError, BusHandler};
use quill_provider::{ProviderError, ProviderRequest};

use crate::orchestrator::Orchestrator;

/// Channel the page relay uses for provider calls.
pub const CHANNEL_PROVIDER_REQUEST: &str = "provider_request";
/// Channel the approval UI uses to settle connection approvals.
pub const CHANNEL_RESOLVE_APPROVAL: &str = "resolve_approval";
/// Channel the approval UI uses to list pending requests.
pub const CHANNEL_APPROVAL_QUEUE: &str = "approval_queue";
/// Channel the approval UI uses to fetch parked compose/sign parameters.
pub const CHANNEL_TAKE_HANDOFF: &str = "take_handoff";

/// Response envelope for the provider channel: exactly one of `result` or
/// `error` is present, so the relay always gets a definitive settlement.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderError>,
}

impl ResponseEnvelope {
    fn from_outcome(outcome: Result<JsonValue, ProviderError>) -> Self {
        match outcome {
            Ok(result) => Self { result: Some(result), error: None },
            Err(error) => Self { result: None, error: Some(error) },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResolveApprovalParams {
    id: String,
    approved: bool,
    #[serde(default)]
    payload: JsonValue,
}

#[derive(Debug, Deserialize)]
struct TakeHandoffParams {
    request_id: String,
}

/// The background context's bus handler: the single place page-relay and
/// approval-UI traffic enters the broker.
pub struct BackgroundHandler {
    orchestrator: Arc<Orchestrator>,
}

impl BackgroundHandler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Arc<Self> {
        Arc::new(Self { orchestrator })
    }

    async fn provider_request(&self, payload: JsonValue) -> Result<JsonValue, BusError> {
        let request: ProviderRequest = serde_json::from_value(payload)
            .map_err(|err| BusError::handler(format!("malformed provider request: {err}")))?;
        let outcome = self.orchestrator.handle_request(request).await;
        serde_json::to_value(ResponseEnvelope::from_outcome(outcome))
            .map_err(|err| BusError::handler(err.to_string()))
    }

    fn resolve_approval(&self, payload: JsonValue) -> Result<JsonValue, BusError> {
        let params: ResolveApprovalParams = serde_json::from_value(payload)
            .map_err(|err| BusError::handler(format!("malformed resolve params: {err}")))?;
        let resolved = self.orchestrator.approvals().resolve_approval(
            &params.id,
            params.approved,
            params.payload,
        );
        Ok(json!({ "resolved": resolved }))
    }

    fn approval_queue(&self) -> Result<JsonValue, BusError> {
        serde_json::to_value(self.orchestrator.approvals().approval_queue())
            .map_err(|err| BusError::handler(err.to_string()))
    }

    fn take_handoff(&self, payload: JsonValue) -> Result<JsonValue, BusError> {
        let params: TakeHandoffParams = serde_json::from_value(payload)
            .map_err(|err| BusError::handler(format!("malformed handoff params: {err}")))?;
        let record = self
            .orchestrator
            .take_handoff(&params.request_id)
            .map_err(|err| BusError::handler(err.to_string()))?;
        serde_json::to_value(json!({ "record": record }))
            .map_err(|err| BusError::handler(err.to_string()))
    }
}

#[async_trait]
impl BusHandler for BackgroundHandler {
    async fn handle(&self, channel: &str, payload: JsonValue) -> Result<JsonValue, BusError> {
        match channel {
            CHANNEL_PROVIDER_REQUEST => self.provider_request(payload).await,
            CHANNEL_RESOLVE_APPROVAL => self.resolve_approval(payload),
            CHANNEL_APPROVAL_QUEUE => self.approval_queue(),
            CHANNEL_TAKE_HANDOFF => self.take_handoff(payload),
            other => Err(BusError::handler(format!("unknown channel '{other}'"))),
        }
    }
}
