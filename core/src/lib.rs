/// ClassLink Sync - Real-time Messaging Synchronization Engine
///
/// Client-side engine that keeps conversations, messages, read state,
/// typing indicators, and presence eventually consistent over a single
/// persistent connection, with optimistic sends and bounded reconnect.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod presence;
pub mod receipts;
pub mod reconcile;
pub mod store;
pub mod typing;
pub mod types;
pub mod wire;

pub use client::ChatClient;
pub use config::Config;
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{Result, SyncError};
