//! Per-session message store
//!
//! One ordered, deduplicated list per session, fed by three sources:
//! optimistic local appends, send confirmations, and push/history merges.
//! The list is kept sorted by `(sent_at, id)` at all times; ids are
//! unique. Confirmed messages are immutable — a re-delivered copy of a
//! known id is ignored.

use liveline_protocol::{DeliveryState, SupportMessage};

/// Outcome of merging one remote message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Duplicate,
}

/// Outcome of reconciling a send confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The optimistic entry was replaced in place by the canonical copy.
    Replaced { temp_id: String },
    /// The canonical copy had already arrived via push; the optimistic
    /// entry was dropped in its favor.
    Superseded { temp_id: String },
    /// No optimistic entry matched; the canonical copy was inserted.
    Inserted,
    /// The canonical copy was already present and no optimistic entry
    /// remained.
    Duplicate,
}

#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<SupportMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[SupportMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&SupportMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Append an optimistic local message (temp id, `Sending`).
    pub fn append_local(&mut self, message: SupportMessage) {
        debug_assert_eq!(message.delivery, DeliveryState::Sending);
        self.insert_ordered(message);
    }

    /// Merge a server-delivered message (push event or history batch).
    ///
    /// Known ids are ignored; new ones are inserted at the position the
    /// ordering key dictates, since history fetches can arrive out of
    /// order relative to push events.
    pub fn merge(&mut self, message: SupportMessage) -> MergeOutcome {
        if self.contains(&message.id) {
            return MergeOutcome::Duplicate;
        }
        self.insert_ordered(message);
        MergeOutcome::Inserted
    }

    /// Reconcile the canonical message returned by a send call.
    ///
    /// Locates the most recently inserted `Sending` entry with the same
    /// sender and content and replaces it in place. If the canonical id
    /// already arrived via push, the optimistic entry is dropped instead
    /// of producing a duplicate.
    pub fn confirm(&mut self, canonical: SupportMessage) -> ConfirmOutcome {
        let temp_idx = self
            .messages
            .iter()
            .rposition(|m| {
                m.delivery == DeliveryState::Sending
                    && m.sender == canonical.sender
                    && m.content == canonical.content
            });

        let already_present = self.contains(&canonical.id);
        match (temp_idx, already_present) {
            (Some(idx), true) => {
                let temp_id = self.messages.remove(idx).id;
                ConfirmOutcome::Superseded { temp_id }
            }
            (Some(idx), false) => {
                let temp_id = self.messages.remove(idx).id;
                self.insert_ordered(canonical);
                ConfirmOutcome::Replaced { temp_id }
            }
            (None, true) => ConfirmOutcome::Duplicate,
            (None, false) => {
                self.insert_ordered(canonical);
                ConfirmOutcome::Inserted
            }
        }
    }

    /// Mark a `Sending` entry as failed, in place. Returns false if the
    /// id is unknown or not in flight.
    pub fn mark_failed(&mut self, message_id: &str) -> bool {
        match self
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.delivery == DeliveryState::Sending)
        {
            Some(m) => {
                m.delivery = DeliveryState::Failed;
                true
            }
            None => false,
        }
    }

    /// Flip a `Failed` entry back to `Sending` for a retry, returning its
    /// content.
    pub fn mark_retrying(&mut self, message_id: &str) -> Option<String> {
        let m = self
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.delivery == DeliveryState::Failed)?;
        m.delivery = DeliveryState::Sending;
        Some(m.content.clone())
    }

    fn insert_ordered(&mut self, message: SupportMessage) {
        let key = (message.sent_at, message.id.clone());
        let idx = self
            .messages
            .partition_point(|m| (m.sent_at, m.id.as_str()) < (key.0, key.1.as_str()));
        self.messages.insert(idx, message);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use liveline_protocol::SenderKind;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn msg(id: &str, content: &str, secs: i64) -> SupportMessage {
        SupportMessage {
            id: id.to_string(),
            session_id: "s1".to_string(),
            sender: SenderKind::User,
            content: content.to_string(),
            sent_at: ts(secs),
            delivery: DeliveryState::Confirmed,
        }
    }

    fn local(id: &str, content: &str, secs: i64) -> SupportMessage {
        SupportMessage {
            delivery: DeliveryState::Sending,
            ..msg(id, content, secs)
        }
    }

    fn ids(store: &MessageStore) -> Vec<&str> {
        store.messages().iter().map(|m| m.id.as_str()).collect()
    }

    fn assert_sorted(store: &MessageStore) {
        let keys: Vec<_> = store.messages().iter().map(|m| m.sort_key()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted, "store must stay sorted by (sent_at, id)");
    }

    #[test]
    fn merge_inserts_in_timestamp_order() {
        let mut store = MessageStore::new();
        store.merge(msg("m3", "c", 30));
        store.merge(msg("m1", "a", 10));
        store.merge(msg("m2", "b", 20));

        assert_eq!(ids(&store), vec!["m1", "m2", "m3"]);
        assert_sorted(&store);
    }

    #[test]
    fn merge_breaks_timestamp_ties_by_id() {
        let mut store = MessageStore::new();
        store.merge(msg("mB", "b", 10));
        store.merge(msg("mA", "a", 10));

        assert_eq!(ids(&store), vec!["mA", "mB"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut store = MessageStore::new();
        assert_eq!(store.merge(msg("m1", "a", 10)), MergeOutcome::Inserted);
        assert_eq!(store.merge(msg("m1", "a", 10)), MergeOutcome::Duplicate);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn overlapping_history_batches_do_not_duplicate() {
        let mut store = MessageStore::new();
        for m in [msg("m1", "a", 10), msg("m2", "b", 20), msg("m3", "c", 30)] {
            store.merge(m);
        }
        // Re-fetch overlaps the first batch and extends it.
        for m in [msg("m2", "b", 20), msg("m3", "c", 30), msg("m4", "d", 40)] {
            store.merge(m);
        }
        assert_eq!(ids(&store), vec!["m1", "m2", "m3", "m4"]);
        assert_sorted(&store);
    }

    #[test]
    fn any_delivery_order_converges_to_same_list() {
        let batch = [
            msg("m1", "a", 10),
            msg("m2", "b", 20),
            msg("m3", "c", 20),
            msg("m4", "d", 40),
        ];
        let orders: [[usize; 4]; 3] = [[0, 1, 2, 3], [3, 2, 1, 0], [2, 0, 3, 1]];

        let mut expected: Option<Vec<String>> = None;
        for order in orders {
            let mut store = MessageStore::new();
            for i in order {
                store.merge(batch[i].clone());
            }
            assert_sorted(&store);
            let got: Vec<String> = store.messages().iter().map(|m| m.id.clone()).collect();
            match &expected {
                None => expected = Some(got),
                Some(e) => assert_eq!(&got, e),
            }
        }
    }

    #[test]
    fn confirm_replaces_optimistic_entry_in_place() {
        let mut store = MessageStore::new();
        store.append_local(local("local-1", "Hello", 100));

        let outcome = store.confirm(msg("m42", "Hello", 101));
        assert_eq!(
            outcome,
            ConfirmOutcome::Replaced {
                temp_id: "local-1".to_string()
            }
        );
        assert_eq!(ids(&store), vec!["m42"]);
        assert_eq!(store.get("m42").unwrap().delivery, DeliveryState::Confirmed);
    }

    #[test]
    fn confirm_matches_most_recent_pending_entry() {
        let mut store = MessageStore::new();
        store.append_local(local("local-1", "Hello", 100));
        store.append_local(local("local-2", "Hello", 110));

        let outcome = store.confirm(msg("m42", "Hello", 111));
        assert_eq!(
            outcome,
            ConfirmOutcome::Replaced {
                temp_id: "local-2".to_string()
            }
        );
        assert_eq!(ids(&store), vec!["local-1", "m42"]);
    }

    #[test]
    fn confirm_after_push_drops_optimistic_duplicate() {
        // Push delivery of the canonical message beat the send response.
        let mut store = MessageStore::new();
        store.append_local(local("local-1", "Hello", 100));
        store.merge(msg("m42", "Hello", 101));

        let outcome = store.confirm(msg("m42", "Hello", 101));
        assert_eq!(
            outcome,
            ConfirmOutcome::Superseded {
                temp_id: "local-1".to_string()
            }
        );
        assert_eq!(ids(&store), vec!["m42"]);
    }

    #[test]
    fn push_after_confirm_is_ignored() {
        let mut store = MessageStore::new();
        store.append_local(local("local-1", "Hello", 100));
        store.confirm(msg("m42", "Hello", 101));

        assert_eq!(store.merge(msg("m42", "Hello", 101)), MergeOutcome::Duplicate);
        assert_eq!(ids(&store), vec!["m42"]);
    }

    #[test]
    fn confirm_with_no_match_appends_canonical() {
        let mut store = MessageStore::new();
        let outcome = store.confirm(msg("m42", "Hello", 101));
        assert_eq!(outcome, ConfirmOutcome::Inserted);
        assert_eq!(ids(&store), vec!["m42"]);
    }

    #[test]
    fn canonical_timestamp_can_reposition_the_entry() {
        let mut store = MessageStore::new();
        store.merge(msg("m1", "earlier", 50));
        store.append_local(local("local-1", "Hello", 100));

        // Server assigned a canonical timestamp before m1.
        store.confirm(msg("m42", "Hello", 40));
        assert_eq!(ids(&store), vec!["m42", "m1"]);
        assert_sorted(&store);
    }

    #[test]
    fn failed_send_is_marked_in_place_and_retryable() {
        let mut store = MessageStore::new();
        store.append_local(local("local-1", "Hello", 100));

        assert!(store.mark_failed("local-1"));
        assert_eq!(store.get("local-1").unwrap().delivery, DeliveryState::Failed);

        let content = store.mark_retrying("local-1");
        assert_eq!(content.as_deref(), Some("Hello"));
        assert_eq!(
            store.get("local-1").unwrap().delivery,
            DeliveryState::Sending
        );
    }

    #[test]
    fn confirmed_messages_cannot_be_marked_failed() {
        let mut store = MessageStore::new();
        store.merge(msg("m1", "a", 10));
        assert!(!store.mark_failed("m1"));
        assert!(store.mark_retrying("m1").is_none());
    }
}
