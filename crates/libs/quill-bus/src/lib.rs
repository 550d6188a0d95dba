//! Cross-context message bus for the quill wallet broker.
//!
//! The extension runs as three isolated execution contexts — the page relay,
//! the background broker, and the approval UI — with no shared memory. This
//! crate is the only channel between them:
//!
//! - **Request/response**: [`MessageBus::request`] delivers a payload to the
//!   handler attached for a target context and awaits its reply. If no
//!   handler is attached the call fails fast with
//!   [`BusError::TargetUnavailable`]; the bus never queues indefinitely.
//! - **Pub/sub**: [`MessageBus::subscribe`] returns a [`BusSubscription`]
//!   observing each published occurrence at most once. Dropping the
//!   subscription deregisters it; dropping the last one for a topic prunes
//!   the topic entry, so per-request topics leave nothing behind.
//!
//! Ordering: one request/response pair is never reordered (the reply is
//! awaited directly); unrelated requests and topics carry no ordering
//! guarantee — callers correlate by request id, never by arrival order.

pub mod error;

pub use error::BusError;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Default bound on one cross-context round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const TOPIC_CAPACITY: usize = 32;

/// The isolated execution contexts a message can target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutionContext {
    PageRelay,
    Background,
    ApprovalUi,
}

impl ExecutionContext {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageRelay => "page-relay",
            Self::Background => "background",
            Self::ApprovalUi => "approval-ui",
        }
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request handler a context attaches to receive bus traffic.
#[async_trait]
pub trait BusHandler: Send + Sync {
    async fn handle(&self, channel: &str, payload: JsonValue) -> Result<JsonValue, BusError>;
}

/// The shared bus instance. One per process; contexts attach handlers and
/// subscribers against it.
#[derive(Default)]
pub struct MessageBus {
    handlers: Mutex<HashMap<ExecutionContext, Arc<dyn BusHandler>>>,
    topics: TopicMap,
}

type TopicMap = Arc<Mutex<HashMap<String, broadcast::Sender<JsonValue>>>>;

impl MessageBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach (or replace) the request handler for a context.
    pub fn attach(&self, context: ExecutionContext, handler: Arc<dyn BusHandler>) {
        self.handlers.lock().expect("bus handlers poisoned").insert(context, handler);
    }

    /// Detach the handler for a context. Idempotent.
    pub fn detach(&self, context: ExecutionContext) {
        self.handlers.lock().expect("bus handlers poisoned").remove(&context);
    }

    /// Deliver a request to `target` and await its response, bounded by
    /// [`DEFAULT_REQUEST_TIMEOUT`].
    pub async fn request(
        &self,
        target: ExecutionContext,
        channel: &str,
        payload: JsonValue,
    ) -> Result<JsonValue, BusError> {
        self.request_with_timeout(target, channel, payload, DEFAULT_REQUEST_TIMEOUT).await
    }

    /// Deliver a request to `target` with an explicit deadline.
    pub async fn request_with_timeout(
        &self,
        target: ExecutionContext,
        channel: &str,
        payload: JsonValue,
        timeout: Duration,
    ) -> Result<JsonValue, BusError> {
        let handler = {
            let handlers = self.handlers.lock().expect("bus handlers poisoned");
            handlers.get(&target).cloned()
        };
        let Some(handler) = handler else {
            return Err(BusError::TargetUnavailable { context: target });
        };

        match tokio::time::timeout(timeout, handler.handle(channel, payload)).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("bus request on '{channel}' to {target} timed out");
                Err(BusError::Timeout { channel: channel.to_string() })
            }
        }
    }

    /// Subscribe to a topic. Each occurrence published after this call is
    /// observed at most once; dropping the subscription unregisters it, and
    /// the last drop for a topic removes its entry.
    pub fn subscribe(&self, topic: &str) -> BusSubscription {
        let mut topics = self.topics.lock().expect("bus topics poisoned");
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0);
        let rx = sender.subscribe();
        drop(topics);
        BusSubscription { topic: topic.to_string(), rx, topics: Arc::clone(&self.topics) }
    }

    /// Number of live topic entries. Sensitive workflows subscribe to two
    /// fresh per-request topics each, so this must not grow with traffic.
    pub fn topic_count(&self) -> usize {
        self.topics.lock().expect("bus topics poisoned").len()
    }

    /// Publish an occurrence to every current subscriber of `topic`.
    ///
    /// Returns the number of subscribers reached; 0 when nobody is listening
    /// (the entry is pruned so dead topics do not accumulate).
    pub fn publish(&self, topic: &str, payload: JsonValue) -> usize {
        let mut topics = self.topics.lock().expect("bus topics poisoned");
        let Some(sender) = topics.get(topic) else {
            return 0;
        };
        match sender.send(payload) {
            Ok(count) => count,
            Err(_) => {
                topics.remove(topic);
                0
            }
        }
    }
}

/// A live subscription to one topic. Dropping it deregisters the subscriber;
/// the last subscriber's drop prunes the topic entry from the bus.
pub struct BusSubscription {
    topic: String,
    rx: broadcast::Receiver<JsonValue>,
    topics: TopicMap,
}

impl BusSubscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Await the next occurrence on this topic.
    pub async fn recv(&mut self) -> Result<JsonValue, BusError> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Ok(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("subscription on '{}' lagged, skipped {skipped}", self.topic);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(BusError::Closed { topic: self.topic.clone() });
                }
            }
        }
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        let mut topics = self.topics.lock().expect("bus topics poisoned");
        // Our own receiver is still counted here, so 1 means last one out.
        let last = topics
            .get(&self.topic)
            .is_some_and(|sender| sender.receiver_count() <= 1);
        if last {
            topics.remove(&self.topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl BusHandler for Echo {
        async fn handle(&self, channel: &str, payload: JsonValue) -> Result<JsonValue, BusError> {
            Ok(json!({ "channel": channel, "echo": payload }))
        }
    }

    struct Stalls;

    #[async_trait]
    impl BusHandler for Stalls {
        async fn handle(&self, _: &str, _: JsonValue) -> Result<JsonValue, BusError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(JsonValue::Null)
        }
    }

    #[tokio::test]
    async fn request_fails_fast_without_a_handler() {
        let bus = MessageBus::new();
        let err = bus
            .request(ExecutionContext::ApprovalUi, "open", JsonValue::Null)
            .await
            .expect_err("no handler attached");
        assert_eq!(err, BusError::TargetUnavailable { context: ExecutionContext::ApprovalUi });
    }

    #[tokio::test]
    async fn request_routes_to_attached_handler() {
        let bus = MessageBus::new();
        bus.attach(ExecutionContext::Background, Arc::new(Echo));
        let response = bus
            .request(ExecutionContext::Background, "provider_request", json!({"n": 1}))
            .await
            .expect("echo");
        assert_eq!(response, json!({ "channel": "provider_request", "echo": {"n": 1} }));
    }

    #[tokio::test]
    async fn detach_is_idempotent_and_restores_fail_fast() {
        let bus = MessageBus::new();
        bus.attach(ExecutionContext::Background, Arc::new(Echo));
        bus.detach(ExecutionContext::Background);
        bus.detach(ExecutionContext::Background);
        let err = bus
            .request(ExecutionContext::Background, "x", JsonValue::Null)
            .await
            .expect_err("detached");
        assert!(matches!(err, BusError::TargetUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn request_times_out_on_a_stalled_handler() {
        let bus = MessageBus::new();
        bus.attach(ExecutionContext::ApprovalUi, Arc::new(Stalls));
        let err = bus
            .request_with_timeout(
                ExecutionContext::ApprovalUi,
                "open",
                JsonValue::Null,
                Duration::from_secs(1),
            )
            .await
            .expect_err("stalled");
        assert_eq!(err, BusError::Timeout { channel: "open".to_string() });
    }

    #[tokio::test]
    async fn publish_reaches_each_subscriber_once() {
        let bus = MessageBus::new();
        let mut first = bus.subscribe("accountsChanged");
        let mut second = bus.subscribe("accountsChanged");

        let reached = bus.publish("accountsChanged", json!(["addr"]));
        assert_eq!(reached, 2);
        assert_eq!(first.recv().await.expect("first"), json!(["addr"]));
        assert_eq!(second.recv().await.expect("second"), json!(["addr"]));
    }

    #[tokio::test]
    async fn per_request_topics_are_pruned_when_their_subscribers_drop() {
        let bus = MessageBus::new();
        for i in 0..100 {
            let complete = bus.subscribe(&format!("sign_message-complete-{i}"));
            let cancel = bus.subscribe(&format!("sign_message-cancel-{i}"));
            drop(complete);
            drop(cancel);
        }
        assert_eq!(bus.topic_count(), 0);

        // A topic with a remaining subscriber stays registered.
        let first = bus.subscribe("shared");
        let second = bus.subscribe("shared");
        drop(first);
        assert_eq!(bus.topic_count(), 1);
        assert_eq!(bus.publish("shared", json!(1)), 1);
        drop(second);
        assert_eq!(bus.topic_count(), 0);
    }

    #[tokio::test]
    async fn publish_without_subscribers_reports_zero() {
        let bus = MessageBus::new();
        assert_eq!(bus.publish("nobody-home", JsonValue::Null), 0);

        let sub = bus.subscribe("short-lived");
        drop(sub);
        assert_eq!(bus.publish("short-lived", JsonValue::Null), 0);
        // Entry pruned; a fresh subscriber still works.
        let mut again = bus.subscribe("short-lived");
        assert_eq!(bus.publish("short-lived", json!(1)), 1);
        assert_eq!(again.recv().await.expect("recv"), json!(1));
    }
}
