/// Configuration management
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chat server address
    pub server_addr: SocketAddr,

    /// Username of the signed-in user (owns the conversation feed topic)
    pub username: String,

    /// Numeric id of the signed-in user (stamped on optimistic sends)
    pub user_id: i64,

    /// Bearer token passed as a connection parameter
    pub token: String,

    /// Timeout for the TCP dial + handshake
    pub connect_timeout: Duration,

    /// Base delay for linear reconnect backoff (attempt n waits base × n)
    pub reconnect_base_delay: Duration,

    /// Reconnect attempt budget; the connection is fatal once exhausted
    pub max_reconnect_attempts: u32,

    /// Quiet window after the last keystroke before typing-stopped is sent
    pub typing_debounce: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".parse().unwrap(),
            username: String::new(),
            user_id: 0,
            token: String::new(),
            connect_timeout: Duration::from_secs(10),
            reconnect_base_delay: Duration::from_secs(2),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            typing_debounce: Duration::from_secs(3),
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 3 {
            return Err(SyncError::Config(format!(
                "Usage: {} <server_addr> <username> [--user-id <id>] [--token <token>] [--base-delay-ms <ms>] [--max-attempts <n>]",
                args.first().unwrap_or(&"classlink".to_string())
            )));
        }

        let server_addr = args[1]
            .parse::<SocketAddr>()
            .map_err(|_| SyncError::Config("Server address must be host:port".to_string()))?;

        let username = args[2].clone();
        if username.is_empty() {
            return Err(SyncError::Config("Username must not be empty".to_string()));
        }

        let mut token = String::new();
        let mut user_id: i64 = 0;
        let mut base_delay: Option<u64> = None;
        let mut max_attempts: Option<u32> = None;

        let mut i = 3;
        while i < args.len() {
            match args[i].as_str() {
                "--token" => {
                    token = args
                        .get(i + 1)
                        .ok_or_else(|| {
                            SyncError::Config("--token requires a value".to_string())
                        })?
                        .clone();
                    i += 2;
                }
                "--user-id" => {
                    let v = args.get(i + 1).ok_or_else(|| {
                        SyncError::Config("--user-id requires a value".to_string())
                    })?;
                    user_id = v.parse::<i64>().map_err(|_| {
                        SyncError::Config("--user-id must be a number".to_string())
                    })?;
                    i += 2;
                }
                "--base-delay-ms" => {
                    let v = args.get(i + 1).ok_or_else(|| {
                        SyncError::Config("--base-delay-ms requires a value".to_string())
                    })?;
                    base_delay = Some(v.parse::<u64>().map_err(|_| {
                        SyncError::Config("--base-delay-ms must be a number".to_string())
                    })?);
                    i += 2;
                }
                "--max-attempts" => {
                    let v = args.get(i + 1).ok_or_else(|| {
                        SyncError::Config("--max-attempts requires a value".to_string())
                    })?;
                    max_attempts = Some(v.parse::<u32>().map_err(|_| {
                        SyncError::Config("--max-attempts must be a number".to_string())
                    })?);
                    i += 2;
                }
                other => {
                    return Err(SyncError::Config(format!("Unknown argument: {}", other)));
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Ok(t) = std::env::var("CLASSLINK_TOKEN") {
            token = t;
        }
        if let Some(n) = std::env::var("CLASSLINK_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
        {
            max_attempts = Some(n);
        }

        let defaults = Config::default();
        Ok(Self {
            server_addr,
            username,
            user_id,
            token,
            reconnect_base_delay: base_delay
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_base_delay),
            max_reconnect_attempts: max_attempts.unwrap_or(defaults.max_reconnect_attempts),
            ..defaults
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_args_minimal() {
        let cfg = Config::from_args(&args(&["core", "127.0.0.1:9100", "alice"])).unwrap();
        assert_eq!(cfg.username, "alice");
        assert_eq!(cfg.server_addr.port(), 9100);
        assert_eq!(cfg.max_reconnect_attempts, DEFAULT_MAX_RECONNECT_ATTEMPTS);
    }

    #[test]
    fn test_from_args_flags() {
        let cfg = Config::from_args(&args(&[
            "core",
            "127.0.0.1:9100",
            "alice",
            "--base-delay-ms",
            "250",
            "--max-attempts",
            "3",
        ]))
        .unwrap();
        assert_eq!(cfg.reconnect_base_delay, Duration::from_millis(250));
        assert_eq!(cfg.max_reconnect_attempts, 3);
    }

    #[test]
    fn test_from_args_rejects_unknown_flag() {
        assert!(Config::from_args(&args(&["core", "127.0.0.1:9100", "alice", "--bogus"])).is_err());
    }
}
