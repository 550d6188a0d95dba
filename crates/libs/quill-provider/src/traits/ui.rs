use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::NavigationHint;

/// One strategy for putting an approval surface in front of the user.
///
/// Opening must be idempotent: if a surface is already showing, a second
/// `open` re-navigates it instead of stacking windows. Strategies are tried
/// in order by the broker; a strategy that cannot currently open reports an
/// error and the next one is attempted.
#[async_trait]
pub trait UiSurface: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Open (or re-focus) the surface and navigate to the hinted request.
    async fn open(&self, hint: &NavigationHint) -> Result<(), ProviderError>;
}
