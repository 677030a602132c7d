/// Shared types for the messaging sync engine
use serde::{Deserialize, Serialize};

/// One entry in the sidebar conversation list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: i64,
    pub is_group: bool,
    /// Display name of the peer (1:1 conversations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Username of the peer (1:1 conversations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Role of the peer, e.g. "TEACHER" or "STUDENT" (1:1 conversations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Group display name (group conversations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub last_message_preview: String,
    /// RFC3339 timestamp of the last message
    pub last_message_created_at: String,
    pub last_message_sender_username: String,
    pub unread_count: u32,
    /// True once the peer's last-read pointer covers our last message
    pub is_read: bool,
}

/// A message in the active conversation's list.
///
/// While unconfirmed the identity is `temp_id`; after reconciliation the
/// server-assigned `id` takes over and `is_optimistic` is cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub sender_username: String,
    pub content: String,
    pub message_type: String,
    /// RFC3339, lexically comparable with server-issued timestamps
    pub created_at: String,
    #[serde(default)]
    pub is_optimistic: bool,
    #[serde(default)]
    pub is_read: bool,
}

/// Per-conversation read pointers.
///
/// The wire carries a single `otherLastReadMessageId` field whose meaning
/// depends on who sent the receipt; locally the two meanings are kept apart.
#[derive(Debug, Clone, Default)]
pub struct ReadPointers {
    /// Server acknowledgment of our own mark-as-read
    pub acked_self_read_id: Option<i64>,
    /// The peer's last-read pointer
    pub peer_read_id: Option<i64>,
    /// `created_at` of the message at `peer_read_id`, for "seen" rendering
    pub peer_read_at: Option<String>,
}

/// Online/offline status of one user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub is_online: bool,
    /// RFC3339, None while the user has never been seen offline
    pub last_seen: Option<String>,
}
