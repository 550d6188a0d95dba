/// Fire-and-forget usage counters.
///
/// Sinks must never fail or block; the broker calls these on the hot path
/// and ignores whatever happens downstream.
pub trait AnalyticsSink: Send + Sync {
    /// A request for `method` arrived from a page.
    fn record_request(&self, method: &str);

    /// A request for `method` settled with the given machine code
    /// (`"ok"` for success, otherwise a `ProviderError` code).
    fn record_outcome(&self, method: &str, code: &str);
}

/// Sink that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAnalytics;

impl AnalyticsSink for NoopAnalytics {
    fn record_request(&self, _method: &str) {}

    fn record_outcome(&self, _method: &str, _code: &str) {}
}
