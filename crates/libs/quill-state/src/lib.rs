//! Durable origin-keyed state for the quill wallet broker.
//!
//! Every piece of state a hostile page can influence lives here, each owned
//! by exactly one service type:
//!
//! - [`ConnectionStore`] — the persisted origin allow-list
//! - [`ReplayLedger`] — fingerprint-keyed record of signed payloads
//! - [`HandoffStore`] — short-lived compose/sign parameters awaiting the UI
//! - [`RateLimiter`] — in-memory fixed-window call throttling
//!
//! The persisted stores share one [`StateDb`] (a single SQLite connection
//! behind a mutex); reads are safe from any task, writes go through the
//! owning store's methods.

pub mod db;
pub mod handoff;
pub mod permissions;
pub mod replay;
pub mod throttle;

pub use db::{StateDb, StateError};
pub use handoff::{HandoffRecord, HandoffStore};
pub use permissions::{ConnectionGrant, ConnectionStore};
pub use replay::{fingerprint, ReplayLedger, ReplayStatus, ReplayVerdict};
pub use throttle::{RateLimiter, RateLimiterConfig};
