/// Canonical client-side cache of conversations and the active
/// conversation's message list.
use crate::types::{ChatMessage, Conversation};

pub struct ConversationStore {
    self_username: String,
    conversations: Vec<Conversation>,
    /// Messages of the active conversation, ascending by `created_at`
    messages: Vec<ChatMessage>,
    active_id: Option<i64>,
}

impl ConversationStore {
    pub fn new(self_username: String) -> Self {
        Self {
            self_username,
            conversations: Vec::new(),
            messages: Vec::new(),
            active_id: None,
        }
    }

    pub fn self_username(&self) -> &str {
        &self.self_username
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn active_id(&self) -> Option<i64> {
        self.active_id
    }

    /// Replace the sidebar with a freshly fetched conversation list
    pub fn set_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        self.sort_conversations();
    }

    /// Switch the active conversation; the message list starts empty until
    /// history pages are merged in.
    pub fn set_active(&mut self, conversation_id: Option<i64>) {
        if self.active_id != conversation_id {
            self.active_id = conversation_id;
            self.messages.clear();
        }
    }

    pub fn conversation(&self, conversation_id: i64) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    fn conversation_mut(&mut self, conversation_id: i64) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
    }

    /// Insert a message into the active list keeping `created_at`
    /// non-decreasing. Late arrivals slot in before newer entries.
    pub fn insert_sorted(&mut self, message: ChatMessage) {
        let idx = self
            .messages
            .iter()
            .rposition(|m| m.created_at <= message.created_at)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.messages.insert(idx, message);
    }

    /// Append an optimistic message (send path; always the newest entry)
    pub fn push_optimistic(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Confirm the optimistic entry at `idx`. The server timestamp may
    /// postdate messages that arrived while the entry was pending, so the
    /// confirmed entry is moved to its sorted slot when needed.
    pub fn replace_at(&mut self, idx: usize, message: ChatMessage) {
        crate::reconcile::confirm_in_place(&mut self.messages[idx], message);

        let before_ok =
            idx == 0 || self.messages[idx - 1].created_at <= self.messages[idx].created_at;
        let after_ok = self
            .messages
            .get(idx + 1)
            .map_or(true, |next| self.messages[idx].created_at <= next.created_at);
        if !(before_ok && after_ok) {
            let confirmed = self.messages.remove(idx);
            self.insert_sorted(confirmed);
        }
    }

    pub fn find_message_created_at(&self, message_id: i64) -> Option<String> {
        self.messages
            .iter()
            .find(|m| m.id == Some(message_id))
            .map(|m| m.created_at.clone())
    }

    /// Update the sidebar entry for an inbound or just-sent message:
    /// preview fields, unread count, ordering.
    ///
    /// `unread_count` moves only for conversations that are not active and
    /// only for messages authored by the peer.
    pub fn upsert_from_message(&mut self, message: &ChatMessage, is_active: bool) {
        let from_self = message.sender_username == self.self_username;

        if self.conversation(message.conversation_id).is_none() {
            // First message to/from a new peer creates the sidebar entry
            self.conversations.push(Conversation {
                id: message.conversation_id,
                is_group: false,
                name: None,
                username: if from_self {
                    None
                } else {
                    Some(message.sender_username.clone())
                },
                role: None,
                display_name: None,
                last_message_preview: String::new(),
                last_message_created_at: String::new(),
                last_message_sender_username: String::new(),
                unread_count: 0,
                is_read: false,
            });
        }

        let conv = self
            .conversation_mut(message.conversation_id)
            .expect("conversation inserted above");

        conv.last_message_preview = message.content.clone();
        conv.last_message_created_at = message.created_at.clone();
        conv.last_message_sender_username = message.sender_username.clone();
        if !is_active && !from_self {
            conv.unread_count += 1;
        }
        // A new last message is unseen by the peer until their next receipt
        if from_self {
            conv.is_read = false;
        }

        self.sort_conversations();
    }

    /// Zero the unread counter of the active conversation
    pub fn mark_active_read(&mut self) {
        if let Some(id) = self.active_id {
            self.zero_unread(id);
        }
    }

    pub fn zero_unread(&mut self, conversation_id: i64) {
        if let Some(conv) = self.conversation_mut(conversation_id) {
            conv.unread_count = 0;
        }
    }

    pub fn set_conversation_read(&mut self, conversation_id: i64) {
        if let Some(conv) = self.conversation_mut(conversation_id) {
            conv.is_read = true;
        }
    }

    /// Merge one history page (server order: newest first) into the active
    /// list. Pages arrive while paging backwards, so the reversed page is
    /// prepended; entries already present by id are skipped.
    pub fn merge_history_page(&mut self, conversation_id: i64, page_newest_first: Vec<ChatMessage>) {
        if self.active_id != Some(conversation_id) {
            return;
        }

        let mut ascending: Vec<ChatMessage> = page_newest_first
            .into_iter()
            .rev()
            .filter(|m| m.id.is_none() || !self.messages.iter().any(|e| e.id == m.id))
            .collect();

        ascending.append(&mut self.messages);
        self.messages = ascending;
    }

    fn sort_conversations(&mut self) {
        self.conversations
            .sort_by(|a, b| b.last_message_created_at.cmp(&a.last_message_created_at));
    }
}
