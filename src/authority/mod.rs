//! Authority Coordinator
//!
//! Exactly one runtime may actuate real devices at a time. The backend holds
//! the lease by default; frontends acquire it, renew it with heartbeats and
//! lose it on release or silence.

pub mod coordinator;
pub mod lease;
pub mod session;

pub use coordinator::AuthorityCoordinator;
pub use lease::{AuthorityLease, LeaseStatus, SignalKind, Transition};
pub use session::{FrontendSession, LOCAL_CONNECTION};
