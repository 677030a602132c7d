/// Read-receipt tracking: per-conversation self and peer last-read
/// pointers plus the derived "seen" timestamp.
use crate::events::ReadReceiptPayload;
use crate::store::ConversationStore;
use crate::types::ReadPointers;
use std::collections::HashMap;

pub struct ReadReceiptTracker {
    self_username: String,
    pointers: HashMap<i64, ReadPointers>,
}

impl ReadReceiptTracker {
    pub fn new(self_username: String) -> Self {
        Self {
            self_username,
            pointers: HashMap::new(),
        }
    }

    pub fn pointers(&self, conversation_id: i64) -> Option<&ReadPointers> {
        self.pointers.get(&conversation_id)
    }

    /// Seed pointers from a history fetch response
    pub fn seed(
        &mut self,
        conversation_id: i64,
        self_last_read: Option<i64>,
        other_last_read: Option<i64>,
        store: &ConversationStore,
    ) {
        let entry = self.pointers.entry(conversation_id).or_default();
        entry.acked_self_read_id = self_last_read;
        entry.peer_read_id = other_last_read;
        entry.peer_read_at = other_last_read.and_then(|id| store.find_message_created_at(id));
    }

    /// Advance our own pointer locally (reconciled send or published
    /// mark-as-read; the server ack confirms it later)
    pub fn advance_self(&mut self, conversation_id: i64, message_id: i64) {
        let entry = self.pointers.entry(conversation_id).or_default();
        entry.acked_self_read_id = Some(message_id);
    }

    /// Apply an inbound READ_RECEIPT.
    ///
    /// The payload field is named from the sender's perspective: a receipt
    /// we authored acknowledges our own pointer, a peer receipt advances
    /// theirs and flips the sidebar `is_read`.
    pub fn apply(&mut self, payload: &ReadReceiptPayload, store: &mut ConversationStore) {
        let entry = self.pointers.entry(payload.conversation_id).or_default();

        if payload.username == self.self_username {
            entry.acked_self_read_id = Some(payload.other_last_read_message_id);
            store.zero_unread(payload.conversation_id);
        } else {
            entry.peer_read_id = Some(payload.other_last_read_message_id);
            entry.peer_read_at =
                store.find_message_created_at(payload.other_last_read_message_id);
            store.set_conversation_read(payload.conversation_id);
        }
    }

    /// Decide whether a mark-as-read should be published for the active
    /// conversation: only while the tab is visible and only when the last
    /// message was authored by the peer.
    pub fn should_mark_as_read(
        &self,
        store: &ConversationStore,
        tab_visible: bool,
    ) -> Option<(i64, i64)> {
        if !tab_visible {
            return None;
        }
        let conversation_id = store.active_id()?;
        let last = store.messages().last()?;
        if last.sender_username == self.self_username {
            return None;
        }
        Some((conversation_id, last.id?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    fn store_with_messages() -> ConversationStore {
        let mut store = ConversationStore::new("alice".to_string());
        store.set_active(Some(1));
        for (id, at) in [(1, "2026-01-01T10:00:00.000Z"), (2, "2026-01-01T10:00:05.000Z")] {
            store.insert_sorted(ChatMessage {
                id: Some(id),
                temp_id: None,
                conversation_id: 1,
                sender_id: 20,
                sender_username: "bob".to_string(),
                content: format!("m{}", id),
                message_type: "TEXT".to_string(),
                created_at: at.to_string(),
                is_optimistic: false,
                is_read: false,
            });
        }
        store
    }

    #[test]
    fn test_peer_receipt_resolves_seen_timestamp() {
        let mut store = store_with_messages();
        let mut tracker = ReadReceiptTracker::new("alice".to_string());

        let payload = ReadReceiptPayload {
            conversation_id: 1,
            username: "bob".to_string(),
            other_last_read_message_id: 2,
        };
        tracker.apply(&payload, &mut store);

        let pointers = tracker.pointers(1).unwrap();
        assert_eq!(pointers.peer_read_id, Some(2));
        assert_eq!(
            pointers.peer_read_at.as_deref(),
            Some("2026-01-01T10:00:05.000Z")
        );
    }

    #[test]
    fn test_self_receipt_acks_own_pointer_and_zeroes_unread() {
        let mut store = store_with_messages();
        let msg = store.messages()[1].clone();
        store.upsert_from_message(&msg, false); // unread_count -> 1
        let mut tracker = ReadReceiptTracker::new("alice".to_string());

        let payload = ReadReceiptPayload {
            conversation_id: 1,
            username: "alice".to_string(),
            other_last_read_message_id: 2,
        };
        tracker.apply(&payload, &mut store);

        assert_eq!(tracker.pointers(1).unwrap().acked_self_read_id, Some(2));
        assert_eq!(tracker.pointers(1).unwrap().peer_read_id, None);
        assert_eq!(store.conversation(1).unwrap().unread_count, 0);
    }

    #[test]
    fn test_mark_as_read_requires_visible_tab() {
        let store = store_with_messages();
        let tracker = ReadReceiptTracker::new("alice".to_string());
        assert!(tracker.should_mark_as_read(&store, false).is_none());
        assert_eq!(tracker.should_mark_as_read(&store, true), Some((1, 2)));
    }

    #[test]
    fn test_mark_as_read_skips_self_authored_tail() {
        let mut store = store_with_messages();
        store.insert_sorted(ChatMessage {
            id: Some(3),
            temp_id: None,
            conversation_id: 1,
            sender_id: 10,
            sender_username: "alice".to_string(),
            content: "mine".to_string(),
            message_type: "TEXT".to_string(),
            created_at: "2026-01-01T10:00:10.000Z".to_string(),
            is_optimistic: false,
            is_read: false,
        });
        let tracker = ReadReceiptTracker::new("alice".to_string());
        assert!(tracker.should_mark_as_read(&store, true).is_none());
    }
}
