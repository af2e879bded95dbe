//! Liveline Coordinator
//!
//! Client-side coordination engine for live support sessions: an
//! in-memory session registry driven by a pure state machine, idempotent
//! message reconciliation across optimistic writes, history fetches, and
//! push events, typing presence with TTL expiry, single-winner claim
//! arbitration, and a push-channel adapter that degrades to polling when
//! the transport drops.
//!
//! All mutations funnel through one state-owning task; reads are
//! lock-free snapshots.

mod actor;
mod claim;
mod command;
mod presence;
mod registry;
mod session;
mod store;
mod transition;

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod push;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{HttpSupportApi, SupportApi};
pub use config::CoordinatorConfig;
pub use coordinator::{ClaimOutcome, Coordinator, Identity, JoinedSession};
pub use error::{ApiError, CoordinatorError, TransportError};
pub use push::{PushConnection, PushTransport};

pub use liveline_protocol as protocol;
