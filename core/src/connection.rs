/// Connection manager: owns the transport lifecycle, the subscription
/// registry, and reconnect-with-linear-backoff.
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::wire::{ClientFrame, ServerFrame, PROTOCOL_VERSION};
use async_trait::async_trait;
use futures_util::{future::BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

const READ_KEEPALIVE_WINDOW: Duration = Duration::from_secs(30);

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, no automatic attempts pending
    Disconnected,
    /// Dial + handshake in progress
    Connecting,
    /// Fully connected and dispatching
    Connected,
    /// Waiting out a backoff delay before the next attempt
    Reconnecting,
    /// Attempt budget exhausted; no further automatic attempts
    Fatal,
}

pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One freshly dialed bidirectional byte stream
pub struct Duplex {
    pub reader: BoxReader,
    pub writer: BoxWriter,
}

/// Transport seam: produces a new duplex per attempt. Injectable so tests
/// can run the manager against in-memory pipes.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self) -> Result<Duplex>;
}

/// Default TCP transport
pub struct TcpDialer {
    addr: std::net::SocketAddr,
}

impl TcpDialer {
    pub fn new(addr: std::net::SocketAddr) -> Self {
        Self { addr }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self) -> Result<Duplex> {
        let stream = TcpStream::connect(self.addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Duplex {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }
}

/// Subscription callback; invoked serially with each frame body
pub type Handler = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Connection-state observer; receives the new connected flag
pub type StateListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Linear backoff: attempt n waits base × n (not exponential)
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * attempt
}

/// Manages one persistent bidirectional connection.
///
/// Meant to be cloned into tasks; all state is shared behind Arc.
pub struct ConnectionManager {
    token: String,
    connect_timeout: Duration,
    reconnect_base_delay: Duration,
    max_reconnect_attempts: u32,

    dialer: Arc<dyn Dialer>,
    state: Arc<RwLock<ConnectionState>>,
    subscriptions: Arc<RwLock<HashMap<String, Vec<(u64, Handler)>>>>,
    next_subscription_id: Arc<AtomicU64>,
    listeners: Arc<RwLock<Vec<StateListener>>>,
    writer: Arc<Mutex<Option<BoxWriter>>>,
    shutdown: Arc<RwLock<bool>>,
    reconnect_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    reader_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ConnectionManager {
    pub fn new(config: &Config, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            token: config.token.clone(),
            connect_timeout: config.connect_timeout,
            reconnect_base_delay: config.reconnect_base_delay,
            max_reconnect_attempts: config.max_reconnect_attempts,
            dialer,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            next_subscription_id: Arc::new(AtomicU64::new(1)),
            listeners: Arc::new(RwLock::new(Vec::new())),
            writer: Arc::new(Mutex::new(None)),
            shutdown: Arc::new(RwLock::new(false)),
            reconnect_task: Arc::new(Mutex::new(None)),
            reader_task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_tcp(config: &Config) -> Self {
        Self::new(config, Arc::new(TcpDialer::new(config.server_addr)))
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Register a connection-state observer
    pub async fn on_connection_change(&self, listener: StateListener) {
        self.listeners.write().await.push(listener);
    }

    /// Connect and perform the handshake. Resolves once the server has
    /// acknowledged the session.
    pub async fn connect(&self) -> Result<()> {
        *self.shutdown.write().await = false;
        self.set_state(ConnectionState::Connecting).await;

        match self.establish().await {
            Ok(()) => {
                self.notify_listeners(true).await;
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected).await;
                Err(e)
            }
        }
    }

    /// Tear down the transport and drop all subscriptions
    pub async fn disconnect(&self) {
        *self.shutdown.write().await = true;

        if let Some(task) = self.reconnect_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }

        let mut writer = self.writer.lock().await;
        if let Some(w) = writer.as_mut() {
            let frame = ClientFrame::Close {
                reason: "client disconnect".to_string(),
            };
            let _ = Self::write_to(w, &frame).await;
        }
        *writer = None;
        drop(writer);

        self.subscriptions.write().await.clear();
        self.set_state(ConnectionState::Disconnected).await;
        self.notify_listeners(false).await;
        info!("Disconnected");
    }

    /// Publish a JSON body to an application destination
    pub async fn publish(&self, destination: &str, body: serde_json::Value) -> Result<()> {
        if !self.is_connected().await {
            return Err(SyncError::Connection(format!(
                "Cannot publish to {} while disconnected",
                destination
            )));
        }
        self.send_frame(&ClientFrame::Send {
            destination: destination.to_string(),
            body,
        })
        .await
    }

    /// Register a handler for a destination. The subscription survives
    /// reconnects; the returned handle removes it.
    pub async fn subscribe(&self, destination: &str, handler: Handler) -> Result<Subscription> {
        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions
            .write()
            .await
            .entry(destination.to_string())
            .or_default()
            .push((id, handler));

        if self.is_connected().await {
            self.send_frame(&ClientFrame::Subscribe {
                id,
                destination: destination.to_string(),
            })
            .await?;
        }
        debug!("Subscribed {} to {}", id, destination);

        Ok(Subscription {
            id,
            destination: destination.to_string(),
            manager: self.clone(),
        })
    }

    // ─── Internals ───────────────────────────────────────────────────────

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    async fn notify_listeners(&self, connected: bool) {
        let listeners = self.listeners.read().await.clone();
        for listener in listeners {
            listener(connected);
        }
    }

    /// Dial, handshake, re-issue subscriptions, spawn the read loop.
    ///
    /// Boxed: the reconnect path re-enters `establish` through the read
    /// loop, and the indirection keeps the spawned futures `Send`.
    fn establish(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            let mut duplex = timeout(self.connect_timeout, self.dialer.dial())
                .await
                .map_err(|_| SyncError::Timeout("Connect timeout".to_string()))??;

            let connect = ClientFrame::Connect {
                token: self.token.clone(),
                protocol_version: PROTOCOL_VERSION,
            };
            Self::write_to(&mut duplex.writer, &connect).await?;

            let ack = timeout(self.connect_timeout, Self::read_from(&mut duplex.reader))
                .await
                .map_err(|_| SyncError::Timeout("Handshake timeout".to_string()))??;

            match ack {
                ServerFrame::Connected {
                    username,
                    protocol_version,
                } => {
                    if protocol_version != PROTOCOL_VERSION {
                        return Err(SyncError::Protocol(format!(
                            "Protocol version mismatch: expected {}, got {}",
                            PROTOCOL_VERSION, protocol_version
                        )));
                    }
                    info!("Session established for {}", username);
                }
                other => {
                    return Err(SyncError::Protocol(format!(
                        "Expected connected ack, got {}",
                        other
                    )));
                }
            }

            // Subscriptions are not assumed to survive a reconnect
            {
                let subscriptions = self.subscriptions.read().await;
                for (destination, subs) in subscriptions.iter() {
                    if let Some((id, _)) = subs.first() {
                        Self::write_to(
                            &mut duplex.writer,
                            &ClientFrame::Subscribe {
                                id: *id,
                                destination: destination.clone(),
                            },
                        )
                        .await?;
                    }
                }
            }

            *self.writer.lock().await = Some(duplex.writer);
            self.set_state(ConnectionState::Connected).await;

            let manager = self.clone();
            let task = tokio::spawn(async move {
                manager.run_read_loop(duplex.reader).await;
            });
            *self.reader_task.lock().await = Some(task);

            Ok(())
        }
        .boxed()
    }

    /// Serial frame loop: every inbound frame is fully dispatched before
    /// the next read.
    async fn run_read_loop(&self, mut reader: BoxReader) {
        loop {
            if *self.shutdown.read().await {
                return;
            }

            let frame = match timeout(READ_KEEPALIVE_WINDOW, Self::read_from(&mut reader)).await {
                Ok(Ok(frame)) => frame,
                Ok(Err(SyncError::Io(e)))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Connection closed by server");
                    break;
                }
                Ok(Err(e)) => {
                    error!("Read error: {}", e);
                    break;
                }
                Err(_) => {
                    // Quiet link; probe it
                    let ping = ClientFrame::Ping {
                        timestamp: chrono::Utc::now().timestamp(),
                    };
                    if self.send_frame(&ping).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            match frame {
                ServerFrame::Message { destination, body } => {
                    let handlers: Vec<Handler> = {
                        let subscriptions = self.subscriptions.read().await;
                        subscriptions
                            .get(&destination)
                            .map(|subs| subs.iter().map(|(_, h)| h.clone()).collect())
                            .unwrap_or_default()
                    };
                    if handlers.is_empty() {
                        debug!("No subscriber for {}", destination);
                    }
                    for handler in handlers {
                        handler(body.clone()).await;
                    }
                }
                ServerFrame::Pong { timestamp } => {
                    debug!("Keepalive pong ({})", timestamp);
                }
                ServerFrame::Close { reason } => {
                    info!("Server closed connection: {}", reason);
                    break;
                }
                ServerFrame::Connected { .. } => {
                    debug!("Ignoring duplicate connected ack");
                }
            }
        }

        if *self.shutdown.read().await {
            return;
        }

        // Unexpected drop: enter the bounded reconnect cycle
        *self.writer.lock().await = None;
        let manager = self.clone();
        let task = tokio::spawn(async move {
            manager.run_reconnect().await;
        });
        *self.reconnect_task.lock().await = Some(task);
    }

    /// Bounded reconnect: attempt n waits base × n; after the budget the
    /// connection is fatally disconnected and reported to listeners.
    async fn run_reconnect(&self) {
        self.set_state(ConnectionState::Reconnecting).await;
        self.notify_listeners(false).await;

        for attempt in 1..=self.max_reconnect_attempts {
            sleep(backoff_delay(self.reconnect_base_delay, attempt)).await;

            if *self.shutdown.read().await {
                return;
            }

            self.set_state(ConnectionState::Connecting).await;
            info!(
                "Reconnect attempt {}/{}",
                attempt, self.max_reconnect_attempts
            );
            match self.establish().await {
                Ok(()) => {
                    info!("Reconnected on attempt {}", attempt);
                    self.notify_listeners(true).await;
                    return;
                }
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempt, e);
                    self.set_state(ConnectionState::Reconnecting).await;
                }
            }
        }

        error!(
            "Giving up after {} reconnect attempts",
            self.max_reconnect_attempts
        );
        self.set_state(ConnectionState::Fatal).await;
        self.notify_listeners(false).await;
    }

    async fn send_frame(&self, frame: &ClientFrame) -> Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(w) => Self::write_to(w, frame).await,
            None => Err(SyncError::Connection("Transport is down".to_string())),
        }
    }

    async fn write_to(writer: &mut BoxWriter, frame: &ClientFrame) -> Result<()> {
        let payload = frame.to_bytes()?;
        let wire = crate::wire::Frame::from_payload(payload);
        writer.write_all(&wire.to_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn read_from(reader: &mut BoxReader) -> Result<ServerFrame> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await?;
        let length = u32::from_be_bytes(len_buf) as usize;

        let mut payload = vec![0u8; length];
        reader.read_exact(&mut payload).await?;

        ServerFrame::from_bytes(&payload)
            .map_err(|e| SyncError::Protocol(format!("Invalid frame: {}", e)))
    }

    async fn remove_subscription(&self, destination: &str, id: u64) {
        let mut subscriptions = self.subscriptions.write().await;
        let now_empty = if let Some(subs) = subscriptions.get_mut(destination) {
            subs.retain(|(sub_id, _)| *sub_id != id);
            subs.is_empty()
        } else {
            false
        };
        if now_empty {
            subscriptions.remove(destination);
        }
        drop(subscriptions);

        if now_empty && self.is_connected().await {
            let _ = self.send_frame(&ClientFrame::Unsubscribe { id }).await;
        }
    }
}

impl Clone for ConnectionManager {
    fn clone(&self) -> Self {
        Self {
            token: self.token.clone(),
            connect_timeout: self.connect_timeout,
            reconnect_base_delay: self.reconnect_base_delay,
            max_reconnect_attempts: self.max_reconnect_attempts,
            dialer: self.dialer.clone(),
            state: self.state.clone(),
            subscriptions: self.subscriptions.clone(),
            next_subscription_id: self.next_subscription_id.clone(),
            listeners: self.listeners.clone(),
            writer: self.writer.clone(),
            shutdown: self.shutdown.clone(),
            reconnect_task: self.reconnect_task.clone(),
            reader_task: self.reader_task.clone(),
        }
    }
}

/// Handle returned by `subscribe`; consuming it removes the registration
pub struct Subscription {
    id: u64,
    destination: String,
    manager: ConnectionManager,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub async fn unsubscribe(self) {
        self.manager
            .remove_subscription(&self.destination, self.id)
            .await;
    }
}
