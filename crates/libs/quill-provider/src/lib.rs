//! Boundary types for the quill wallet broker.
//!
//! This crate defines the contract between the background broker and its
//! collaborators (keychain/wallet service, approval UI surfaces, analytics).
//! It provides:
//!
//! - **Boundary types** for the provider method namespace and page events
//! - **`ProviderError`** — the full error taxonomy every request settles with
//! - **Async trait definitions** for the external collaborators
//! - **`StubWallet`** — a configurable in-memory wallet for tests
//!
//! # Trait hierarchy
//!
//! Three focused collaborator traits:
//!
//! - [`WalletService`] — unlock state, active address, network broadcast
//! - [`UiSurface`] — an idempotent "open approval surface" strategy
//! - [`AnalyticsSink`] — fire-and-forget counters

pub mod error;
pub mod traits;
pub mod types;

pub use error::ProviderError;
pub use traits::{AnalyticsSink, NoopAnalytics, UiSurface, WalletService};
pub use types::*;

mod stub;
pub use stub::StubWallet;
