/// Optimistic reconciliation — binding a server echo to the locally
/// inserted optimistic message it confirms.
///
/// Pure over the message slice so each fallback tier is testable on its
/// own; the state mutation lives in the store.
use crate::types::ChatMessage;

/// What the dispatcher should do with an incoming confirmed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Replace the optimistic entry at this index in place
    Replace(usize),
    /// The message is already present; drop the echo
    Duplicate,
    /// No optimistic candidate; append as new (latent duplication risk)
    Append,
}

/// Resolve an incoming confirmed message against the current list.
///
/// Fallback chain: exact `temp_id` match, then the most recent optimistic
/// entry from the same sender with equal trimmed content, then the most
/// recent optimistic entry from the same sender regardless of content.
pub fn reconcile(messages: &[ChatMessage], incoming: &ChatMessage) -> ReconcileOutcome {
    if let Some(idx) = find_optimistic_slot(messages, incoming) {
        return ReconcileOutcome::Replace(idx);
    }
    if is_already_present(messages, incoming) {
        return ReconcileOutcome::Duplicate;
    }
    ReconcileOutcome::Append
}

fn find_optimistic_slot(messages: &[ChatMessage], incoming: &ChatMessage) -> Option<usize> {
    // Tier 1: client-supplied correlation id
    if let Some(temp_id) = incoming.temp_id.as_deref() {
        if let Some(idx) = messages
            .iter()
            .position(|m| m.is_optimistic && m.temp_id.as_deref() == Some(temp_id))
        {
            return Some(idx);
        }
    }

    // Tier 2: most recent optimistic from the same sender with equal content
    let content = incoming.content.trim();
    if let Some(idx) = messages.iter().rposition(|m| {
        m.is_optimistic && m.sender_id == incoming.sender_id && m.content.trim() == content
    }) {
        return Some(idx);
    }

    // Tier 3: most recent optimistic from the same sender, any content
    messages
        .iter()
        .rposition(|m| m.is_optimistic && m.sender_id == incoming.sender_id)
}

fn is_already_present(messages: &[ChatMessage], incoming: &ChatMessage) -> bool {
    match incoming.id {
        // A peer may legitimately send the same text twice under new ids,
        // so a present server id is the only duplicate signal here
        Some(id) => messages.iter().any(|m| m.id == Some(id)),
        None => messages.iter().any(|m| {
            !m.is_optimistic
                && m.sender_id == incoming.sender_id
                && m.content.trim() == incoming.content.trim()
        }),
    }
}

/// In-place replacement of an optimistic entry by its confirmation.
/// Position is preserved; the confirmed identity and timestamp win.
pub fn confirm_in_place(slot: &mut ChatMessage, incoming: ChatMessage) {
    *slot = ChatMessage {
        is_optimistic: false,
        is_read: false,
        ..incoming
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimistic(temp_id: &str, sender_id: i64, content: &str, created_at: &str) -> ChatMessage {
        ChatMessage {
            id: None,
            temp_id: Some(temp_id.to_string()),
            conversation_id: 1,
            sender_id,
            sender_username: "alice".to_string(),
            content: content.to_string(),
            message_type: "TEXT".to_string(),
            created_at: created_at.to_string(),
            is_optimistic: true,
            is_read: false,
        }
    }

    fn confirmed(
        id: i64,
        temp_id: Option<&str>,
        sender_id: i64,
        content: &str,
        created_at: &str,
    ) -> ChatMessage {
        ChatMessage {
            id: Some(id),
            temp_id: temp_id.map(|t| t.to_string()),
            conversation_id: 1,
            sender_id,
            sender_username: "alice".to_string(),
            content: content.to_string(),
            message_type: "TEXT".to_string(),
            created_at: created_at.to_string(),
            is_optimistic: false,
            is_read: false,
        }
    }

    #[test]
    fn test_tier1_temp_id_match() {
        let messages = vec![
            optimistic("t1", 10, "hi", "2026-01-01T10:00:00.000Z"),
            optimistic("t2", 10, "hi", "2026-01-01T10:00:01.000Z"),
        ];
        let incoming = confirmed(42, Some("t1"), 10, "hi", "2026-01-01T10:00:02.000Z");
        assert_eq!(reconcile(&messages, &incoming), ReconcileOutcome::Replace(0));
    }

    #[test]
    fn test_tier2_content_match_prefers_most_recent() {
        let messages = vec![
            optimistic("t1", 10, "ok", "2026-01-01T10:00:00.000Z"),
            optimistic("t2", 10, "ok", "2026-01-01T10:00:01.000Z"),
        ];
        // Echo without a tempId must resolve to the most recent candidate
        let incoming = confirmed(42, None, 10, "ok", "2026-01-01T10:00:02.000Z");
        assert_eq!(reconcile(&messages, &incoming), ReconcileOutcome::Replace(1));
    }

    #[test]
    fn test_tier2_trims_content() {
        let messages = vec![optimistic("t1", 10, "  hello ", "2026-01-01T10:00:00.000Z")];
        let incoming = confirmed(42, None, 10, "hello", "2026-01-01T10:00:01.000Z");
        assert_eq!(reconcile(&messages, &incoming), ReconcileOutcome::Replace(0));
    }

    #[test]
    fn test_tier3_sender_only_last_resort() {
        let messages = vec![
            confirmed(1, None, 10, "older", "2026-01-01T09:00:00.000Z"),
            optimistic("t1", 10, "edited locally", "2026-01-01T10:00:00.000Z"),
        ];
        let incoming = confirmed(42, None, 10, "different text", "2026-01-01T10:00:01.000Z");
        assert_eq!(reconcile(&messages, &incoming), ReconcileOutcome::Replace(1));
    }

    #[test]
    fn test_tier3_ignores_other_senders() {
        let messages = vec![optimistic("t1", 99, "theirs", "2026-01-01T10:00:00.000Z")];
        let incoming = confirmed(42, None, 10, "mine", "2026-01-01T10:00:01.000Z");
        assert_eq!(reconcile(&messages, &incoming), ReconcileOutcome::Append);
    }

    #[test]
    fn test_duplicate_by_id() {
        let messages = vec![confirmed(42, None, 10, "hi", "2026-01-01T10:00:00.000Z")];
        let incoming = confirmed(42, None, 10, "hi", "2026-01-01T10:00:00.000Z");
        assert_eq!(reconcile(&messages, &incoming), ReconcileOutcome::Duplicate);
    }

    #[test]
    fn test_duplicate_by_content_and_sender() {
        let messages = vec![confirmed(42, None, 10, "hi", "2026-01-01T10:00:00.000Z")];
        // Echo missing the server id but matching a confirmed entry
        let incoming = confirmed(43, None, 10, " hi ", "2026-01-01T10:00:00.000Z");
        // Different id, same trimmed content from the same sender
        let incoming = ChatMessage { id: None, ..incoming };
        assert_eq!(reconcile(&messages, &incoming), ReconcileOutcome::Duplicate);
    }

    #[test]
    fn test_repeated_text_under_new_id_is_not_a_duplicate() {
        let messages = vec![confirmed(42, None, 20, "ok", "2026-01-01T10:00:00.000Z")];
        let incoming = confirmed(43, None, 20, "ok", "2026-01-01T10:00:05.000Z");
        assert_eq!(reconcile(&messages, &incoming), ReconcileOutcome::Append);
    }

    #[test]
    fn test_append_when_nothing_matches() {
        let messages: Vec<ChatMessage> = Vec::new();
        let incoming = confirmed(42, Some("t9"), 10, "hi", "2026-01-01T10:00:00.000Z");
        assert_eq!(reconcile(&messages, &incoming), ReconcileOutcome::Append);
    }

    #[test]
    fn test_confirm_in_place_clears_flags() {
        let mut slot = optimistic("t1", 10, "hi", "2026-01-01T10:00:00.000Z");
        let incoming = confirmed(42, Some("t1"), 10, "hi", "2026-01-01T10:00:01.000Z");
        confirm_in_place(&mut slot, incoming);
        assert_eq!(slot.id, Some(42));
        assert!(!slot.is_optimistic);
        assert!(!slot.is_read);
    }

    #[test]
    fn test_two_echoes_resolve_to_distinct_entries() {
        // N sends and N echoes leave exactly N messages
        let mut messages = vec![
            optimistic("t1", 10, "ok", "2026-01-01T10:00:00.000Z"),
            optimistic("t2", 10, "ok", "2026-01-01T10:00:01.000Z"),
        ];

        let first = confirmed(41, None, 10, "ok", "2026-01-01T10:00:02.000Z");
        match reconcile(&messages, &first) {
            ReconcileOutcome::Replace(idx) => confirm_in_place(&mut messages[idx], first),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let second = confirmed(42, None, 10, "ok", "2026-01-01T10:00:03.000Z");
        match reconcile(&messages, &second) {
            ReconcileOutcome::Replace(idx) => confirm_in_place(&mut messages[idx], second),
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| !m.is_optimistic));
        let ids: Vec<_> = messages.iter().filter_map(|m| m.id).collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }
}
