/// Typing indicators: debounced outbound signaling and the transient
/// who-is-typing map fed by inbound TYPING events.
use crate::events::TypingPayload;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Single-shot cancellable timer. Arming replaces any outstanding timer,
/// so each keystroke resets the quiet window (debounce, not throttle).
#[derive(Default)]
pub struct Debounce {
    handle: Option<JoinHandle<()>>,
}

impl Debounce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm<F>(&mut self, delay: Duration, fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            sleep(delay).await;
            fire.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Debounce {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub struct TypingCoordinator {
    /// conversation -> username currently composing there
    typers: HashMap<i64, String>,
    /// Conversation with a published typing-started for the current burst
    signaling: Option<i64>,
    debounce: Debounce,
}

impl TypingCoordinator {
    pub fn new() -> Self {
        Self {
            typers: HashMap::new(),
            signaling: None,
            debounce: Debounce::new(),
        }
    }

    // ─── Inbound ─────────────────────────────────────────────────────────

    /// A start event overwrites the entry, a stop event deletes it. There
    /// is no expiry beyond an explicit stop.
    pub fn apply(&mut self, payload: &TypingPayload) {
        if payload.typing {
            self.typers
                .insert(payload.conversation_id, payload.username.clone());
        } else {
            self.typers.remove(&payload.conversation_id);
        }
    }

    /// Current typer in one conversation (active-view rendering)
    pub fn typer_for(&self, conversation_id: i64) -> Option<&str> {
        self.typers.get(&conversation_id).map(String::as_str)
    }

    /// All conversations with an active typer (sidebar previews)
    pub fn typers(&self) -> &HashMap<i64, String> {
        &self.typers
    }

    // ─── Outbound ────────────────────────────────────────────────────────

    /// Called on each keystroke. Bursts are keyed by conversation: typing
    /// in a new conversation ends the previous burst. Returns the
    /// conversation whose typing-stopped must be published (if any) and
    /// whether a typing-started must be published.
    pub fn begin_burst(&mut self, conversation_id: i64) -> (Option<i64>, bool) {
        match self.signaling {
            Some(current) if current == conversation_id => (None, false),
            previous => {
                self.signaling = Some(conversation_id);
                (previous, true)
            }
        }
    }

    /// Called when the burst ends (debounce fired or a message was sent).
    /// Returns the conversation whose typing-stopped must be published.
    pub fn end_burst(&mut self) -> Option<i64> {
        self.debounce.cancel();
        self.signaling.take()
    }

    /// Called from inside the debounce task itself; must not abort the
    /// running timer. Returns the conversation whose typing-stopped must
    /// be published.
    pub fn timer_fired(&mut self) -> Option<i64> {
        self.signaling.take()
    }

    /// Re-arm the single-shot quiet-window timer; any previously armed
    /// timer is cancelled first.
    pub fn rearm<F>(&mut self, delay: Duration, fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.debounce.arm(delay, fire);
    }
}

impl Default for TypingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
