use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::str::FromStr;

// ── Type aliases ──────────────────────────────────────────────────────────────

/// Web origin (scheme+host+port) of the requesting page.
pub type Origin = String;

/// Generated identifier correlating one in-flight request across contexts.
pub type RequestId = String;

// ── Provider method namespace ─────────────────────────────────────────────────

/// The fixed set of methods a page may invoke.
///
/// Anything that does not parse into this enum is rejected as unsupported
/// before any state is touched.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderMethod {
    Connect,
    Disconnect,
    Accounts,
    IsConnected,
    ChainId,
    SignMessage,
    ComposeSend,
    BroadcastTransaction,
}

/// Rate-limiter category a method falls into.
///
/// Three independent categories so a burst of queries cannot starve
/// connection attempts and vice versa.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MethodClass {
    Connection,
    Transaction,
    General,
}

impl ProviderMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Accounts => "accounts",
            Self::IsConnected => "is_connected",
            Self::ChainId => "chain_id",
            Self::SignMessage => "sign_message",
            Self::ComposeSend => "compose_send",
            Self::BroadcastTransaction => "broadcast_transaction",
        }
    }

    pub fn class(self) -> MethodClass {
        match self {
            Self::Connect | Self::Disconnect => MethodClass::Connection,
            Self::SignMessage | Self::ComposeSend | Self::BroadcastTransaction => {
                MethodClass::Transaction
            }
            Self::Accounts | Self::IsConnected | Self::ChainId => MethodClass::General,
        }
    }

    /// Whether this method requires explicit human confirmation.
    pub fn is_sensitive(self) -> bool {
        matches!(self, Self::SignMessage | Self::ComposeSend | Self::BroadcastTransaction)
    }
}

impl FromStr for ProviderMethod {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "connect" => Ok(Self::Connect),
            "disconnect" => Ok(Self::Disconnect),
            "accounts" => Ok(Self::Accounts),
            "is_connected" => Ok(Self::IsConnected),
            "chain_id" => Ok(Self::ChainId),
            "sign_message" => Ok(Self::SignMessage),
            "compose_send" => Ok(Self::ComposeSend),
            "broadcast_transaction" => Ok(Self::BroadcastTransaction),
            _ => Err(()),
        }
    }
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// One inbound page request as delivered by the relay.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct ProviderRequest {
    pub origin: Origin,
    pub method: String,
    #[serde(default)]
    pub params: Vec<JsonValue>,
    #[serde(default)]
    pub metadata: BTreeMap<String, JsonValue>,
}

impl ProviderRequest {
    pub fn new(origin: impl Into<Origin>, method: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            method: method.into(),
            params: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<JsonValue>) -> Self {
        self.params = params;
        self
    }
}

// ── Page-facing events ────────────────────────────────────────────────────────

/// Provider events pushed to a specific origin's page context.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
#[non_exhaustive]
pub enum ProviderEvent {
    AccountsChanged { accounts: Vec<String> },
    Disconnect,
    Message { name: String, data: JsonValue },
}

/// Navigation hint handed to a UI surface so it can route straight to the
/// pending request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct NavigationHint {
    pub request_id: RequestId,
    pub route: String,
}

impl NavigationHint {
    pub fn new(request_id: impl Into<RequestId>, route: impl Into<String>) -> Self {
        Self { request_id: request_id.into(), route: route.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_namespace_round_trips() {
        for name in [
            "connect",
            "disconnect",
            "accounts",
            "is_connected",
            "chain_id",
            "sign_message",
            "compose_send",
            "broadcast_transaction",
        ] {
            let method: ProviderMethod = name.parse().expect("known method");
            assert_eq!(method.as_str(), name);
        }
        assert!("eth_sendTransaction".parse::<ProviderMethod>().is_err());
    }

    #[test]
    fn sensitive_methods_are_transaction_class() {
        for method in [
            ProviderMethod::SignMessage,
            ProviderMethod::ComposeSend,
            ProviderMethod::BroadcastTransaction,
        ] {
            assert!(method.is_sensitive());
            assert_eq!(method.class(), MethodClass::Transaction);
        }
        assert_eq!(ProviderMethod::Connect.class(), MethodClass::Connection);
        assert_eq!(ProviderMethod::ChainId.class(), MethodClass::General);
    }
}
