//! Transport Adapter
//!
//! Carries buffer deltas and authority signals between the frontend and
//! backend runtimes. Delivery is at-least-once and every handler is
//! idempotent, so a reconnecting link may replay freely.

pub mod hub;
pub mod link;
pub mod message;

pub use hub::TransportHub;
pub use link::{attach, memory_link, LinkEnd};
pub use message::{AuthorityGrant, AuthoritySignal, TransportMessage};
