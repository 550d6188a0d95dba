//! Background request broker for the quill wallet extension.
//!
//! Mediates every request an untrusted page makes against wallet
//! capabilities: permission checks, per-category rate limits, replay
//! protection, and mandatory human confirmation before anything sensitive
//! happens. The [`orchestrator::Orchestrator`] is the sole entry point;
//! [`handlers::BackgroundHandler`] exposes it on the message bus.

pub mod config;
pub mod handlers;
pub mod ids;
pub mod orchestrator;
pub mod ui;

pub use config::BrokerConfig;
pub use handlers::BackgroundHandler;
pub use orchestrator::Orchestrator;
pub use ui::{BusUiSurface, SurfaceOpener};
