use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use quill_bus::{ExecutionContext, MessageBus};
use quill_provider::{NavigationHint, ProviderError, UiSurface};

/// Channel an attached approval UI serves for open/navigate requests.
pub const CHANNEL_OPEN_SURFACE: &str = "open_surface";

/// Ordered chain of UI-surface strategies.
///
/// Strategies are tried in sequence, each bounded by a short timeout; the
/// first success wins. Exhausting the chain yields a definitive
/// [`ProviderError::UiUnavailable`] instead of an ad hoc nest of fallbacks.
pub struct SurfaceOpener {
    strategies: Vec<Arc<dyn UiSurface>>,
    attempt_timeout: Duration,
}

impl SurfaceOpener {
    pub fn new(strategies: Vec<Arc<dyn UiSurface>>, attempt_timeout: Duration) -> Self {
        Self { strategies, attempt_timeout }
    }

    pub async fn open(&self, hint: &NavigationHint) -> Result<(), ProviderError> {
        for strategy in &self.strategies {
            match tokio::time::timeout(self.attempt_timeout, strategy.open(hint)).await {
                Ok(Ok(())) => {
                    log::debug!("surface '{}' opened for request {}", strategy.name(), hint.request_id);
                    return Ok(());
                }
                Ok(Err(err)) => {
                    log::debug!("surface '{}' declined: {err}", strategy.name());
                }
                Err(_) => {
                    log::debug!("surface '{}' timed out", strategy.name());
                }
            }
        }
        log::warn!("no approval surface available for request {}", hint.request_id);
        Err(ProviderError::UiUnavailable)
    }
}

/// Surface strategy that asks an approval UI attached to the bus to open.
///
/// Fails fast when no UI context is attached, letting the chain move on to
/// its next strategy.
pub struct BusUiSurface {
    bus: Arc<MessageBus>,
}

impl BusUiSurface {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl UiSurface for BusUiSurface {
    fn name(&self) -> &'static str {
        "bus-approval-ui"
    }

    async fn open(&self, hint: &NavigationHint) -> Result<(), ProviderError> {
        let payload = serde_json::to_value(hint)
            .map_err(|err| ProviderError::internal(err.to_string()))?;
        self.bus
            .request(ExecutionContext::ApprovalUi, CHANNEL_OPEN_SURFACE, payload)
            .await
            .map(|_| ())
            .map_err(|err| ProviderError::internal(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Declines;

    #[async_trait]
    impl UiSurface for Declines {
        fn name(&self) -> &'static str {
            "declines"
        }

        async fn open(&self, _hint: &NavigationHint) -> Result<(), ProviderError> {
            Err(ProviderError::internal("window manager refused"))
        }
    }

    struct Stalls;

    #[async_trait]
    impl UiSurface for Stalls {
        fn name(&self) -> &'static str {
            "stalls"
        }

        async fn open(&self, _hint: &NavigationHint) -> Result<(), ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    struct Opens(AtomicU32);

    #[async_trait]
    impl UiSurface for Opens {
        fn name(&self) -> &'static str {
            "opens"
        }

        async fn open(&self, _hint: &NavigationHint) -> Result<(), ProviderError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn falls_through_to_the_first_working_strategy() {
        let opens = Arc::new(Opens(AtomicU32::new(0)));
        let opener = SurfaceOpener::new(
            vec![Arc::new(Declines), Arc::new(Stalls), opens.clone()],
            Duration::from_secs(1),
        );
        opener.open(&NavigationHint::new("req-1", "approve")).await.expect("opens");
        assert_eq!(opens.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_chain_is_a_definitive_error() {
        let opener = SurfaceOpener::new(vec![Arc::new(Declines)], Duration::from_secs(1));
        let err = opener
            .open(&NavigationHint::new("req-2", "approve"))
            .await
            .expect_err("exhausted");
        assert_eq!(err, ProviderError::UiUnavailable);
    }

    #[tokio::test]
    async fn bus_surface_fails_fast_without_an_attached_ui() {
        let surface = BusUiSurface::new(MessageBus::new());
        let err = surface
            .open(&NavigationHint::new("req-3", "approve"))
            .await
            .expect_err("no ui context");
        assert!(matches!(err, ProviderError::Internal { .. }));
    }
}
