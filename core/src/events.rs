/// Inbound event envelope, payload types, and the dispatcher that fans
/// events out to the trackers.
use crate::reconcile::{reconcile, ReconcileOutcome};
use crate::store::ConversationStore;
use crate::types::ChatMessage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Closed set of event kinds delivered on the conversation feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Message,
    ReadReceipt,
    Typing,
    Presence,
}

impl EventKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "MESSAGE" => Some(EventKind::Message),
            "READ_RECEIPT" => Some(EventKind::ReadReceipt),
            "TYPING" => Some(EventKind::Typing),
            "PRESENCE" => Some(EventKind::Presence),
            _ => None,
        }
    }
}

/// The `{type, payload}` envelope carried on the per-user feed
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptPayload {
    pub conversation_id: i64,
    /// Who advanced their pointer (may be us: the server echoes our own
    /// mark-as-read back as an acknowledgment)
    pub username: String,
    /// Field name is from the sender's perspective; see ReadReceiptTracker
    pub other_last_read_message_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: i64,
    pub username: String,
    /// false acts as the stop event
    pub typing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub username: String,
    pub is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}

/// Parse an online-users snapshot body (plain JSON array of usernames)
pub fn parse_online_snapshot(raw: &str) -> Option<Vec<String>> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(usernames) => Some(usernames),
        Err(e) => {
            warn!("Dropping malformed online snapshot: {}", e);
            None
        }
    }
}

/// Routes each feed event to the trackers relevant to its type. Dispatch
/// is serial: the caller awaits completion before the next frame.
pub struct EventDispatcher {
    self_username: String,
    store: Arc<RwLock<ConversationStore>>,
    receipts: Arc<RwLock<crate::receipts::ReadReceiptTracker>>,
    typing: Arc<RwLock<crate::typing::TypingCoordinator>>,
    presence: Arc<RwLock<crate::presence::PresenceTracker>>,
}

impl EventDispatcher {
    pub fn new(
        self_username: String,
        store: Arc<RwLock<ConversationStore>>,
        receipts: Arc<RwLock<crate::receipts::ReadReceiptTracker>>,
        typing: Arc<RwLock<crate::typing::TypingCoordinator>>,
        presence: Arc<RwLock<crate::presence::PresenceTracker>>,
    ) -> Self {
        Self {
            self_username,
            store,
            receipts,
            typing,
            presence,
        }
    }

    /// Handle one raw feed frame body. Parse failures and unknown event
    /// types are logged and dropped; they never propagate.
    pub async fn dispatch(&self, raw: &str) {
        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping malformed feed frame: {}", e);
                return;
            }
        };

        let kind = match EventKind::from_tag(&envelope.kind) {
            Some(kind) => kind,
            None => {
                warn!("Ignoring unknown event type: {}", envelope.kind);
                return;
            }
        };

        match kind {
            EventKind::Message => {
                match serde_json::from_value::<ChatMessage>(envelope.payload) {
                    Ok(message) => self.on_message(message).await,
                    Err(e) => warn!("Dropping malformed MESSAGE payload: {}", e),
                }
            }
            EventKind::ReadReceipt => {
                match serde_json::from_value::<ReadReceiptPayload>(envelope.payload) {
                    Ok(payload) => self.on_read_receipt(payload).await,
                    Err(e) => warn!("Dropping malformed READ_RECEIPT payload: {}", e),
                }
            }
            EventKind::Typing => {
                match serde_json::from_value::<TypingPayload>(envelope.payload) {
                    Ok(payload) => self.typing.write().await.apply(&payload),
                    Err(e) => warn!("Dropping malformed TYPING payload: {}", e),
                }
            }
            EventKind::Presence => {
                match serde_json::from_value::<PresencePayload>(envelope.payload) {
                    Ok(payload) => self.presence.write().await.apply(&payload),
                    Err(e) => warn!("Dropping malformed PRESENCE payload: {}", e),
                }
            }
        }
    }

    async fn on_message(&self, mut incoming: ChatMessage) {
        incoming.is_optimistic = false;

        let mut store = self.store.write().await;
        let is_active = store.active_id() == Some(incoming.conversation_id);
        let from_self = incoming.sender_username == self.self_username;

        if is_active {
            match reconcile(store.messages(), &incoming) {
                ReconcileOutcome::Replace(idx) => {
                    debug!(
                        "Reconciled message {:?} into slot {}",
                        incoming.id, idx
                    );
                    let confirmed_id = incoming.id;
                    let conversation_id = incoming.conversation_id;
                    store.replace_at(idx, incoming.clone());
                    if from_self {
                        if let Some(id) = confirmed_id {
                            self.receipts
                                .write()
                                .await
                                .advance_self(conversation_id, id);
                        }
                    }
                }
                ReconcileOutcome::Duplicate => {
                    debug!("Dropping duplicate message {:?}", incoming.id);
                    return;
                }
                ReconcileOutcome::Append => {
                    if from_self {
                        // A send without a registered optimistic entry;
                        // appending risks visible duplication
                        warn!(
                            "Appending unmatched own echo {:?} in conversation {}",
                            incoming.id, incoming.conversation_id
                        );
                    }
                    store.insert_sorted(incoming.clone());
                }
            }
        }

        store.upsert_from_message(&incoming, is_active);
    }

    async fn on_read_receipt(&self, payload: ReadReceiptPayload) {
        let mut store = self.store.write().await;
        self.receipts.write().await.apply(&payload, &mut store);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceTracker;
    use crate::receipts::ReadReceiptTracker;
    use crate::typing::TypingCoordinator;
    use serde_json::json;

    fn dispatcher() -> (EventDispatcher, Arc<RwLock<ConversationStore>>) {
        let store = Arc::new(RwLock::new(ConversationStore::new("alice".to_string())));
        let dispatcher = EventDispatcher::new(
            "alice".to_string(),
            store.clone(),
            Arc::new(RwLock::new(ReadReceiptTracker::new("alice".to_string()))),
            Arc::new(RwLock::new(TypingCoordinator::new())),
            Arc::new(RwLock::new(PresenceTracker::new())),
        );
        (dispatcher, store)
    }

    fn message_event(id: i64, conversation_id: i64, sender: &str, content: &str) -> String {
        json!({
            "type": "MESSAGE",
            "payload": {
                "id": id,
                "conversationId": conversation_id,
                "senderId": if sender == "alice" { 10 } else { 20 },
                "senderUsername": sender,
                "content": content,
                "messageType": "TEXT",
                "createdAt": "2026-01-01T10:00:00.000Z",
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_malformed_frame_is_dropped() {
        let (dispatcher, store) = dispatcher();
        dispatcher.dispatch("{not json").await;
        assert!(store.read().await.conversations().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_ignored() {
        let (dispatcher, store) = dispatcher();
        dispatcher
            .dispatch(&json!({"type": "SOMETHING_NEW", "payload": {}}).to_string())
            .await;
        assert!(store.read().await.conversations().is_empty());
    }

    #[tokio::test]
    async fn test_peer_message_updates_store() {
        let (dispatcher, store) = dispatcher();
        store.write().await.set_active(Some(1));

        dispatcher.dispatch(&message_event(5, 1, "bob", "hello")).await;

        let store = store.read().await;
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.conversation(1).unwrap().last_message_preview, "hello");
        assert_eq!(store.conversation(1).unwrap().unread_count, 0);
    }

    #[tokio::test]
    async fn test_inactive_message_only_touches_sidebar() {
        let (dispatcher, store) = dispatcher();
        store.write().await.set_active(Some(1));

        dispatcher.dispatch(&message_event(5, 2, "bob", "psst")).await;

        let store = store.read().await;
        assert!(store.messages().is_empty());
        assert_eq!(store.conversation(2).unwrap().unread_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_event_does_not_double_count() {
        let (dispatcher, store) = dispatcher();
        store.write().await.set_active(Some(1));

        dispatcher.dispatch(&message_event(5, 1, "bob", "hello")).await;
        dispatcher.dispatch(&message_event(5, 1, "bob", "hello")).await;

        assert_eq!(store.read().await.messages().len(), 1);
    }
}
