mod analytics;
mod ui;
mod wallet;

pub use analytics::{AnalyticsSink, NoopAnalytics};
pub use ui::UiSurface;
pub use wallet::WalletService;
