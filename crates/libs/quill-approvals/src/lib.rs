//! Human-approval orchestration for the quill wallet broker.
//!
//! - [`ApprovalService`] holds pending confirmation requests and settles each
//!   waiting future exactly once — by UI action, manual dismissal, or
//!   timeout, whichever comes first.
//! - [`CriticalOperationRegistry`] tracks in-flight sensitive workflows so an
//!   external update manager can defer disruptive self-updates while any are
//!   outstanding.

pub mod critical;
pub mod service;

pub use critical::{CriticalOperationGuard, CriticalOperationRegistry};
pub use service::{
    ApprovalError, ApprovalKind, ApprovalRequest, ApprovalService, PendingApproval,
    DEFAULT_APPROVAL_TIMEOUT, DEFAULT_COMPOSE_TIMEOUT,
};
