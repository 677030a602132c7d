/// Chat client: composes the connection manager, dispatcher, and trackers
/// into the live synchronization engine.
use crate::config::Config;
use crate::connection::{ConnectionManager, Handler, Subscription};
use crate::error::Result;
use crate::events::{parse_online_snapshot, EventDispatcher};
use crate::presence::PresenceTracker;
use crate::receipts::ReadReceiptTracker;
use crate::store::ConversationStore;
use crate::typing::TypingCoordinator;
use crate::types::{ChatMessage, Conversation, PresenceRecord};
use crate::wire::destinations;
use chrono::{SecondsFormat, Utc};
use futures_util::FutureExt;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

pub struct ChatClient {
    config: Config,
    connection: ConnectionManager,
    store: Arc<RwLock<ConversationStore>>,
    receipts: Arc<RwLock<ReadReceiptTracker>>,
    typing: Arc<RwLock<TypingCoordinator>>,
    presence: Arc<RwLock<PresenceTracker>>,
    dispatcher: Arc<EventDispatcher>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    /// The snapshot listener must be registered once, not once per connect
    presence_listener_installed: AtomicBool,
}

impl ChatClient {
    /// Build a client over an injected connection manager
    pub fn new(config: Config, connection: ConnectionManager) -> Self {
        let store = Arc::new(RwLock::new(ConversationStore::new(config.username.clone())));
        let receipts = Arc::new(RwLock::new(ReadReceiptTracker::new(config.username.clone())));
        let typing = Arc::new(RwLock::new(TypingCoordinator::new()));
        let presence = Arc::new(RwLock::new(PresenceTracker::new()));
        let dispatcher = Arc::new(EventDispatcher::new(
            config.username.clone(),
            store.clone(),
            receipts.clone(),
            typing.clone(),
            presence.clone(),
        ));

        Self {
            config,
            connection,
            store,
            receipts,
            typing,
            presence,
            dispatcher,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            presence_listener_installed: AtomicBool::new(false),
        }
    }

    pub fn with_tcp(config: Config) -> Self {
        let connection = ConnectionManager::with_tcp(&config);
        Self::new(config, connection)
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn store(&self) -> Arc<RwLock<ConversationStore>> {
        self.store.clone()
    }

    /// Connect, wire up the standing subscriptions, and request the first
    /// presence snapshot.
    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await?;
        info!("Connected as {}", self.config.username);

        let presence = self.presence.clone();
        let online_handler: Handler = Arc::new(move |body: String| {
            let presence = presence.clone();
            async move {
                if let Some(usernames) = parse_online_snapshot(&body) {
                    presence.write().await.replace_online(usernames);
                }
            }
            .boxed()
        });

        let mut held = self.subscriptions.lock().await;
        held.push(
            self.connection
                .subscribe(destinations::TOPIC_ONLINE, online_handler.clone())
                .await?,
        );
        held.push(
            self.connection
                .subscribe(destinations::QUEUE_ONLINE, online_handler)
                .await?,
        );

        let dispatcher = self.dispatcher.clone();
        let feed_handler: Handler = Arc::new(move |body: String| {
            let dispatcher = dispatcher.clone();
            async move {
                dispatcher.dispatch(&body).await;
            }
            .boxed()
        });
        held.push(
            self.connection
                .subscribe(
                    &destinations::user_conversations(&self.config.username),
                    feed_handler,
                )
                .await?,
        );
        drop(held);

        // The online set is not trusted across a connection gap; ask for a
        // fresh snapshot now and after every reconnect.
        if !self.presence_listener_installed.swap(true, Ordering::SeqCst) {
            let connection = self.connection.clone();
            self.connection
                .on_connection_change(Arc::new(move |connected| {
                    if connected {
                        let connection = connection.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                connection.publish(destinations::APP_ONLINE, json!({})).await
                            {
                                warn!("Presence snapshot request failed: {}", e);
                            }
                        });
                    }
                }))
                .await;
        }
        self.connection
            .publish(destinations::APP_ONLINE, json!({}))
            .await?;

        Ok(())
    }

    pub async fn disconnect(&self) {
        self.subscriptions.lock().await.clear();
        self.connection.disconnect().await;
    }

    // ─── Sending ─────────────────────────────────────────────────────────

    /// Insert an optimistic message locally, publish the send, and end any
    /// typing burst. Returns the correlation tempId.
    pub async fn send_message(
        &self,
        conversation_id: i64,
        content: &str,
        message_type: &str,
    ) -> Result<String> {
        let temp_id = Uuid::new_v4().to_string();
        let message = ChatMessage {
            id: None,
            temp_id: Some(temp_id.clone()),
            conversation_id,
            sender_id: self.config.user_id,
            sender_username: self.config.username.clone(),
            content: content.to_string(),
            message_type: message_type.to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            is_optimistic: true,
            is_read: false,
        };

        {
            let mut store = self.store.write().await;
            let is_active = store.active_id() == Some(conversation_id);
            if is_active {
                store.push_optimistic(message.clone());
            }
            store.upsert_from_message(&message, is_active);
        }

        self.connection
            .publish(
                destinations::APP_SEND_MESSAGE,
                json!({
                    "conversationId": conversation_id,
                    "tempId": temp_id,
                    "content": content,
                    "messageType": message_type,
                }),
            )
            .await?;

        // Sending ends the typing burst immediately
        if let Some(ended) = self.typing.write().await.end_burst() {
            self.publish_typing(ended, false).await?;
        }

        Ok(temp_id)
    }

    // ─── Typing ──────────────────────────────────────────────────────────

    /// Called on every keystroke in the composer for `conversation_id`
    pub async fn keystroke(&self, conversation_id: i64) -> Result<()> {
        let (ended, started) = self.typing.write().await.begin_burst(conversation_id);
        if let Some(previous) = ended {
            self.publish_typing(previous, false).await?;
        }
        if started {
            self.publish_typing(conversation_id, true).await?;
        }

        let typing = self.typing.clone();
        let connection = self.connection.clone();
        let debounce = self.config.typing_debounce;
        self.typing.write().await.rearm(debounce, async move {
            if let Some(conversation_id) = typing.write().await.timer_fired() {
                let body = json!({ "conversationId": conversation_id });
                if let Err(e) = connection
                    .publish(destinations::APP_TYPING_STOPPED, body)
                    .await
                {
                    warn!("Typing-stopped publish failed: {}", e);
                }
            }
        });

        Ok(())
    }

    async fn publish_typing(&self, conversation_id: i64, started: bool) -> Result<()> {
        let destination = if started {
            destinations::APP_TYPING_STARTED
        } else {
            destinations::APP_TYPING_STOPPED
        };
        self.connection
            .publish(destination, json!({ "conversationId": conversation_id }))
            .await
    }

    /// Who is typing in the given conversation right now
    pub async fn typer_for(&self, conversation_id: i64) -> Option<String> {
        self.typing
            .read()
            .await
            .typer_for(conversation_id)
            .map(str::to_string)
    }

    // ─── Read state ──────────────────────────────────────────────────────

    /// Publish mark-as-read for the active conversation when the gating
    /// conditions hold (tab visible, last message peer-authored).
    pub async fn mark_active_read(&self, tab_visible: bool) -> Result<()> {
        let decision = {
            let store = self.store.read().await;
            let receipts = self.receipts.read().await;
            receipts.should_mark_as_read(&store, tab_visible)
        };

        let (conversation_id, message_id) = match decision {
            Some(pair) => pair,
            None => return Ok(()),
        };

        {
            let mut store = self.store.write().await;
            store.mark_active_read();
            self.receipts
                .write()
                .await
                .advance_self(conversation_id, message_id);
        }

        self.connection
            .publish(
                destinations::APP_MARK_AS_READ,
                json!({
                    "conversationId": conversation_id,
                    "selfLastReadMessageId": message_id,
                }),
            )
            .await
    }

    // ─── Store access ────────────────────────────────────────────────────

    pub async fn set_active_conversation(&self, conversation_id: Option<i64>) {
        self.store.write().await.set_active(conversation_id);
    }

    pub async fn set_conversations(&self, conversations: Vec<Conversation>) {
        self.store.write().await.set_conversations(conversations);
    }

    /// Merge one REST history page (newest first) and seed the read
    /// pointers the page carried.
    pub async fn merge_history_page(
        &self,
        conversation_id: i64,
        page_newest_first: Vec<ChatMessage>,
        self_last_read: Option<i64>,
        other_last_read: Option<i64>,
    ) {
        let mut store = self.store.write().await;
        store.merge_history_page(conversation_id, page_newest_first);
        self.receipts
            .write()
            .await
            .seed(conversation_id, self_last_read, other_last_read, &store);
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.store.read().await.conversations().to_vec()
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.store.read().await.messages().to_vec()
    }

    pub async fn presence_of(&self, username: &str) -> PresenceRecord {
        self.presence.read().await.record(username)
    }
}
