use crate::ExecutionContext;

/// Errors returned by bus operations.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum BusError {
    /// No handler is attached for the target context. The bus never queues
    /// indefinitely; callers fall back (e.g. by opening a UI surface).
    #[error("no listener attached for context {context}")]
    TargetUnavailable { context: ExecutionContext },

    #[error("request on channel '{channel}' timed out")]
    Timeout { channel: String },

    /// The topic's last subscriber went away mid-wait.
    #[error("topic '{topic}' closed")]
    Closed { topic: String },

    #[error("handler rejected request: {message}")]
    Handler { message: String },
}

impl BusError {
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler { message: message.into() }
    }
}
