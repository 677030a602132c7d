/// Wire protocol for the persistent chat connection
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Frames sent by the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Opens the session; the bearer token is a connection parameter
    #[serde(rename = "connect")]
    Connect {
        token: String,
        protocol_version: u8,
    },

    /// Registers interest in a destination
    #[serde(rename = "subscribe")]
    Subscribe { id: u64, destination: String },

    /// Drops a previously registered subscription
    #[serde(rename = "unsubscribe")]
    Unsubscribe { id: u64 },

    /// Publishes a JSON body to an application destination
    #[serde(rename = "send")]
    Send {
        destination: String,
        body: serde_json::Value,
    },

    /// Keepalive probe sent when the link has been quiet
    #[serde(rename = "ping")]
    Ping { timestamp: i64 },

    /// Graceful teardown
    #[serde(rename = "close")]
    Close { reason: String },
}

/// Frames sent by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Handshake acknowledgment
    #[serde(rename = "connected")]
    Connected {
        username: String,
        protocol_version: u8,
    },

    /// A broadcast delivered to one of our subscriptions
    #[serde(rename = "message")]
    Message { destination: String, body: String },

    /// Keepalive response to a client ping
    #[serde(rename = "pong")]
    Pong { timestamp: i64 },

    /// Server-initiated teardown
    #[serde(rename = "close")]
    Close { reason: String },
}

impl ClientFrame {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl ServerFrame {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    pub fn frame_type(&self) -> &'static str {
        match self {
            ServerFrame::Connected { .. } => "connected",
            ServerFrame::Message { .. } => "message",
            ServerFrame::Pong { .. } => "pong",
            ServerFrame::Close { .. } => "close",
        }
    }
}

impl fmt::Display for ServerFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerFrame({})", self.frame_type())
    }
}

/// Protocol frame with length prefix
#[derive(Debug)]
pub struct Frame {
    pub length: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn from_payload(payload: Vec<u8>) -> Self {
        Self {
            length: payload.len() as u32,
            payload,
        }
    }

    /// Serialize frame to bytes (length prefix + payload)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.payload.len());
        buf.extend_from_slice(&self.length.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse frame from bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }

        let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

        if data.len() < 4 + length {
            return None;
        }

        Some(Self {
            length: length as u32,
            payload: data[4..4 + length].to_vec(),
        })
    }
}

// ─── Destinations ────────────────────────────────────────────────────────────

pub mod destinations {
    /// Bulk online-user snapshots (broadcast)
    pub const TOPIC_ONLINE: &str = "/topic/online";

    /// Bulk online-user snapshot addressed to this session
    pub const QUEUE_ONLINE: &str = "/user/queue/online";

    /// Outbound message publish
    pub const APP_SEND_MESSAGE: &str = "/app/conversation.sendMessage";

    /// Outbound typing signals
    pub const APP_TYPING_STARTED: &str = "/app/conversation.typing.started";
    pub const APP_TYPING_STOPPED: &str = "/app/conversation.typing.stopped";

    /// Outbound read pointer advance
    pub const APP_MARK_AS_READ: &str = "/app/conversation.markAsRead";

    /// Requests a fresh presence snapshot (empty body)
    pub const APP_ONLINE: &str = "/app/online";

    /// The per-user event feed carrying the `{type, payload}` envelope
    pub fn user_conversations(username: &str) -> String {
        format!("/topic/user.{}.conversations", username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_serialization() {
        let frame = ClientFrame::Subscribe {
            id: 7,
            destination: destinations::TOPIC_ONLINE.to_string(),
        };
        let bytes = frame.to_bytes().unwrap();
        let deserialized = ClientFrame::from_bytes(&bytes).unwrap();
        assert_eq!(frame, deserialized);
    }

    #[test]
    fn test_server_frame_serialization() {
        let frame = ServerFrame::Message {
            destination: destinations::user_conversations("alice"),
            body: "{\"type\":\"MESSAGE\"}".to_string(),
        };
        let bytes = frame.to_bytes().unwrap();
        let deserialized = ServerFrame::from_bytes(&bytes).unwrap();
        assert_eq!(frame, deserialized);
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = Frame::from_payload(b"{\"type\":\"pong\",\"timestamp\":1}".to_vec());
        let bytes = frame.to_bytes();
        let parsed = Frame::from_bytes(&bytes).unwrap();
        assert_eq!(frame.length, parsed.length);
        assert_eq!(frame.payload, parsed.payload);
    }

    #[test]
    fn test_frame_rejects_short_buffer() {
        assert!(Frame::from_bytes(&[0, 0]).is_none());
        // Length prefix claims more bytes than present
        assert!(Frame::from_bytes(&[0, 0, 0, 9, b'x']).is_none());
    }

    #[test]
    fn test_user_conversations_destination() {
        assert_eq!(
            destinations::user_conversations("bob"),
            "/topic/user.bob.conversations"
        );
    }
}
