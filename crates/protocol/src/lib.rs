//! Liveline Protocol
//!
//! Shared types for the support-session coordination layer: the session
//! and message data model, push-channel events, API payloads, and the
//! update stream consumed by UI subscribers. Wire types are serialized
//! as JSON.

use uuid::Uuid;

pub mod api;
pub mod event;
pub mod types;
pub mod update;

pub use api::ClaimResponse;
pub use event::PushEvent;
pub use types::*;
pub use update::Update;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a temporary ID for an optimistic local message.
///
/// The `local-` prefix keeps temp ids disjoint from server-assigned ids,
/// so a canonical message can never collide with an unconfirmed one.
pub fn local_message_id() -> String {
    format!("local-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ids_carry_prefix() {
        assert!(local_message_id().starts_with("local-"));
    }
}
