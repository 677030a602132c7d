/// ClassLink chat client - Main entry point
use classlink_core::{ChatClient, Config};
use std::env;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let client = ChatClient::with_tcp(config.clone());
    info!("Starting ClassLink sync client");
    info!("   Server: {}", config.server_addr);
    info!("   User:   {}", config.username);

    client
        .connect()
        .await
        .map_err(|e| anyhow::anyhow!("Connect error: {}", e))?;

    // Minimal interactive loop: "<conversation_id> <text>" sends a message
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("ready — type '<conversation_id> <message>' to send, Ctrl+D to quit");
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let (conversation_id, text) = match line.split_once(' ') {
            Some((id, text)) => match id.parse::<i64>() {
                Ok(id) => (id, text),
                Err(_) => {
                    warn!("First token must be a conversation id");
                    continue;
                }
            },
            None => {
                warn!("Expected '<conversation_id> <message>'");
                continue;
            }
        };
        client.set_active_conversation(Some(conversation_id)).await;
        match client.send_message(conversation_id, text, "TEXT").await {
            Ok(temp_id) => info!("sent (tempId {})", temp_id),
            Err(e) => warn!("send failed: {}", e),
        }
    }

    client.disconnect().await;
    Ok(())
}
