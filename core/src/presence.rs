/// Global user presence: the online set and per-user last-seen stamps.
use crate::events::PresencePayload;
use crate::types::PresenceRecord;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct PresenceTracker {
    online: HashSet<String>,
    last_seen: HashMap<String, String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk replacement from an online-users snapshot. The previous set is
    /// discarded wholesale; a stale set is not trusted across a gap.
    pub fn replace_online(&mut self, usernames: Vec<String>) {
        self.online = usernames.into_iter().collect();
    }

    /// Incremental update from a single PRESENCE event
    pub fn apply(&mut self, payload: &PresencePayload) {
        if payload.is_online {
            self.online.insert(payload.username.clone());
        } else {
            self.online.remove(&payload.username);
        }
        if let Some(last_seen) = &payload.last_seen {
            self.last_seen
                .insert(payload.username.clone(), last_seen.clone());
        }
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.online.contains(username)
    }

    pub fn record(&self, username: &str) -> PresenceRecord {
        PresenceRecord {
            is_online: self.is_online(username),
            last_seen: self.last_seen.get(username).cloned(),
        }
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_replaces_previous_set() {
        let mut tracker = PresenceTracker::new();
        tracker.replace_online(vec!["alice".to_string(), "bob".to_string()]);
        tracker.replace_online(vec!["carol".to_string()]);

        assert!(!tracker.is_online("alice"));
        assert!(tracker.is_online("carol"));
        assert_eq!(tracker.online_count(), 1);
    }

    #[test]
    fn test_incremental_event_updates_set_and_last_seen() {
        let mut tracker = PresenceTracker::new();
        tracker.apply(&PresencePayload {
            username: "bob".to_string(),
            is_online: true,
            last_seen: None,
        });
        assert!(tracker.is_online("bob"));

        tracker.apply(&PresencePayload {
            username: "bob".to_string(),
            is_online: false,
            last_seen: Some("2026-01-01T12:00:00.000Z".to_string()),
        });
        let record = tracker.record("bob");
        assert!(!record.is_online);
        assert_eq!(record.last_seen.as_deref(), Some("2026-01-01T12:00:00.000Z"));
    }
}
