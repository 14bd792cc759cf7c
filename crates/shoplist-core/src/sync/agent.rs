//! Client sync agent
//!
//! Keeps a local mirror of the server's list over a long-lived WebSocket
//! connection and reconnects automatically when it drops.
//!
//! ```text
//!  Disconnected ──▶ Connecting ──▶ Connected
//!        ▲              │              │
//!        └──────────────┴──────────────┘
//!        │
//!        └──▶ Failed (retries exhausted, terminal)
//! ```
//!
//! The mirrored list and the connectivity flag are published through
//! `tokio::sync::watch` channels, so any number of readers can observe them
//! while only the agent task writes.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use super::error::AgentError;
use super::message::{ClientMessage, ServerMessage};
use super::reconnect::ReconnectPolicy;
use crate::config::Config;
use crate::models::{is_valid_name, Item};

/// Connection state as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; may be waiting to retry
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and receiving snapshots
    Connected,
    /// Gave up reconnecting
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Events emitted by the agent task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Connection state changed
    StateChanged(ConnectionState),
    /// A new snapshot replaced the local list; carries the item count
    SnapshotReplaced(usize),
    /// About to retry; carries the attempt number
    ReconnectAttempt(u32),
    /// Retries exhausted
    ReconnectFailed,
    /// Error occurred
    Error(String),
}

/// Something the user wants done to the list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    AddItem { name: String },
    ToggleItem { id: String },
    DeleteItem { id: String },
}

impl Intent {
    /// Short description used in user-facing notices
    pub fn action(&self) -> &'static str {
        match self {
            Intent::AddItem { .. } => "add item",
            Intent::ToggleItem { .. } => "toggle item",
            Intent::DeleteItem { .. } => "delete item",
        }
    }

    fn into_message(self) -> Result<ClientMessage, AgentError> {
        match self {
            Intent::AddItem { name } => {
                if !is_valid_name(&name) {
                    return Err(AgentError::Validation("item name is empty".to_string()));
                }
                Ok(ClientMessage::AddItem {
                    name: name.trim().to_string(),
                })
            }
            Intent::ToggleItem { id } => Ok(ClientMessage::ToggleItem {
                id: require_id(id)?,
            }),
            Intent::DeleteItem { id } => Ok(ClientMessage::DeleteItem {
                id: require_id(id)?,
            }),
        }
    }
}

fn require_id(id: String) -> Result<String, AgentError> {
    if id.trim().is_empty() {
        Err(AgentError::Validation("item id is empty".to_string()))
    } else {
        Ok(id)
    }
}

/// Replace a watched value, notifying only if it changed
fn set_if_changed<T: PartialEq>(tx: &watch::Sender<T>, value: T) -> bool {
    tx.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    })
}

/// Client connection state machine
///
/// Owns the write side of the observable state. It knows nothing about
/// sockets; callers report what happened and send whatever it returns.
#[derive(Debug)]
pub struct ConnectionMachine {
    state: watch::Sender<ConnectionState>,
    connected: watch::Sender<bool>,
    snapshot: watch::Sender<Vec<Item>>,
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMachine {
    /// Start disconnected with an empty list
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (connected, _) = watch::channel(false);
        let (snapshot, _) = watch::channel(Vec::new());
        Self {
            state,
            connected,
            snapshot,
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A connection attempt started
    pub fn connecting(&self) -> bool {
        if self.state() == ConnectionState::Failed {
            return false;
        }
        set_if_changed(&self.connected, false);
        set_if_changed(&self.state, ConnectionState::Connecting)
    }

    /// The connection is up; returns the resync request to send
    pub fn connected(&self) -> ClientMessage {
        set_if_changed(&self.connected, true);
        set_if_changed(&self.state, ConnectionState::Connected);
        ClientMessage::GetShoppingList
    }

    /// The connection dropped; the last snapshot is kept
    pub fn disconnected(&self) -> bool {
        if self.state() == ConnectionState::Failed {
            return false;
        }
        set_if_changed(&self.connected, false);
        set_if_changed(&self.state, ConnectionState::Disconnected)
    }

    /// Retries are exhausted
    pub fn failed(&self) -> bool {
        set_if_changed(&self.connected, false);
        set_if_changed(&self.state, ConnectionState::Failed)
    }

    /// Apply a message from the server; returns the new item count
    pub fn receive(&self, message: ServerMessage) -> usize {
        match message {
            ServerMessage::ShoppingList(items) => {
                let count = items.len();
                self.snapshot.send_replace(items);
                count
            }
        }
    }

    /// Read-only view of the observable state
    pub fn view(&self) -> AgentView {
        AgentView {
            state: self.state.subscribe(),
            connected: self.connected.subscribe(),
            snapshot: self.snapshot.subscribe(),
        }
    }
}

/// Read side of the agent's observable state
#[derive(Debug, Clone)]
pub struct AgentView {
    state: watch::Receiver<ConnectionState>,
    connected: watch::Receiver<bool>,
    snapshot: watch::Receiver<Vec<Item>>,
}

impl AgentView {
    /// Copy of the last received list
    pub fn snapshot(&self) -> Vec<Item> {
        self.snapshot.borrow().clone()
    }

    /// Whether the server is reachable right now
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Vec<Item>> {
        self.snapshot.clone()
    }

    pub fn subscribe_connectivity(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Turn an intent into a wire message
    ///
    /// Input is validated first. A valid intent is still refused while
    /// disconnected, with an error that reads as a user-facing notice.
    pub fn prepare(&self, intent: Intent) -> Result<ClientMessage, AgentError> {
        let action = intent.action();
        let message = intent.into_message()?;
        if !self.is_connected() {
            return Err(AgentError::NotConnected { action });
        }
        Ok(message)
    }
}

/// Sync agent settings
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// WebSocket URL of the server
    pub url: String,
    /// Retry schedule after a failed or lost connection
    pub policy: ReconnectPolicy,
    /// Limit on a single connection attempt
    pub connect_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3000".to_string(),
            policy: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(20),
        }
    }
}

impl AgentConfig {
    /// Settings for `url` with default retry behavior
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Settings from the application config
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.server_url.clone(),
            policy: config.reconnect.policy(),
            connect_timeout: config.reconnect.connect_timeout(),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Commands sent to the agent task
#[derive(Debug)]
enum AgentCommand {
    /// Write a message to the server
    Send(ClientMessage),
    /// Close the connection and stop
    Shutdown,
}

/// How a connected session ended
enum SessionEnd {
    /// Connection dropped after being established
    Lost,
    /// Shutdown requested
    Shutdown,
}

/// Handle to a running sync agent
pub struct SyncAgent {
    view: AgentView,
    command_tx: mpsc::Sender<AgentCommand>,
    event_rx: Option<mpsc::Receiver<AgentEvent>>,
    task: Option<JoinHandle<()>>,
}

impl SyncAgent {
    /// Start the agent task
    ///
    /// Must be called from within a tokio runtime. The task connects
    /// immediately and keeps reconnecting per `config.policy`.
    pub fn spawn(config: AgentConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(64);

        let machine = ConnectionMachine::new();
        let view = machine.view();

        let task = AgentTask {
            config,
            machine,
            commands: command_rx,
            events: event_tx,
        };
        let handle = tokio::spawn(task.run());

        Self {
            view,
            command_tx,
            event_rx: Some(event_rx),
            task: Some(handle),
        }
    }

    /// Copy of the last received list
    pub fn snapshot(&self) -> Vec<Item> {
        self.view.snapshot()
    }

    /// Whether the server is reachable right now
    pub fn is_connected(&self) -> bool {
        self.view.is_connected()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.view.state()
    }

    /// Clone of the read-only view
    pub fn view(&self) -> AgentView {
        self.view.clone()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Vec<Item>> {
        self.view.subscribe_snapshot()
    }

    pub fn subscribe_connectivity(&self) -> watch::Receiver<bool> {
        self.view.subscribe_connectivity()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.view.subscribe_state()
    }

    /// Take the event receiver (can only be called once)
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<AgentEvent>> {
        self.event_rx.take()
    }

    /// Ask the server to add an item
    pub async fn add_item(&self, name: &str) -> Result<(), AgentError> {
        self.submit(Intent::AddItem {
            name: name.to_string(),
        })
        .await
    }

    /// Ask the server to flip an item's completed flag
    pub async fn toggle_item(&self, id: &str) -> Result<(), AgentError> {
        self.submit(Intent::ToggleItem { id: id.to_string() }).await
    }

    /// Ask the server to remove an item
    pub async fn delete_item(&self, id: &str) -> Result<(), AgentError> {
        self.submit(Intent::DeleteItem { id: id.to_string() }).await
    }

    /// Ask the server to resend the list
    pub async fn request_snapshot(&self) -> Result<(), AgentError> {
        if !self.view.is_connected() {
            return Err(AgentError::NotConnected {
                action: "refresh list",
            });
        }
        self.send(ClientMessage::GetShoppingList).await
    }

    /// Validate and send an intent
    pub async fn submit(&self, intent: Intent) -> Result<(), AgentError> {
        let message = self.view.prepare(intent)?;
        self.send(message).await
    }

    async fn send(&self, message: ClientMessage) -> Result<(), AgentError> {
        self.command_tx
            .send(AgentCommand::Send(message))
            .await
            .map_err(|_| AgentError::ChannelClosed)
    }

    /// Close the connection and wait for the task to stop
    pub async fn shutdown(mut self) {
        let _ = self.command_tx.send(AgentCommand::Shutdown).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// The agent's background task
struct AgentTask {
    config: AgentConfig,
    machine: ConnectionMachine,
    commands: mpsc::Receiver<AgentCommand>,
    events: mpsc::Sender<AgentEvent>,
}

impl AgentTask {
    /// Main loop with reconnection
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            if self.machine.connecting() {
                self.emit(AgentEvent::StateChanged(ConnectionState::Connecting));
            }

            match self.connect_and_run().await {
                Ok(SessionEnd::Shutdown) => {
                    self.set_disconnected();
                    debug!("Sync agent stopped");
                    return;
                }
                Ok(SessionEnd::Lost) => {
                    attempt = 0;
                }
                Err(e) => {
                    warn!("Sync connection failed: {:#}", e);
                    self.emit(AgentEvent::Error(format!("Connection error: {:#}", e)));
                }
            }

            self.set_disconnected();

            attempt = attempt.saturating_add(1);
            let Some(delay) = self.config.policy.delay_for(attempt) else {
                warn!("Giving up on {} after {} attempts", self.config.url, attempt - 1);
                if self.machine.failed() {
                    self.emit(AgentEvent::StateChanged(ConnectionState::Failed));
                }
                self.emit(AgentEvent::ReconnectFailed);
                return;
            };

            info!(
                "Reconnection attempt {} in {}ms",
                attempt,
                delay.as_millis()
            );
            self.emit(AgentEvent::ReconnectAttempt(attempt));

            let deadline = Instant::now() + delay;
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = drain_until_shutdown(&mut self.commands) => {
                    debug!("Sync agent stopped while waiting to reconnect");
                    return;
                }
            }
        }
    }

    /// Connect and run until the connection drops or shutdown is requested
    ///
    /// Errors are only returned for failures before the connection is up.
    async fn connect_and_run(&mut self) -> Result<SessionEnd> {
        let url = self.config.url.clone();
        debug!("Connecting to {}", url);

        let connect =
            tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str()));
        let ws_stream = tokio::select! {
            result = connect => {
                let (ws_stream, _response) = result
                    .map_err(|_| anyhow!("Timed out connecting to {}", url))?
                    .with_context(|| format!("Failed to connect to {}", url))?;
                ws_stream
            }
            _ = drain_until_shutdown(&mut self.commands) => return Ok(SessionEnd::Shutdown),
        };
        let (mut write, mut read) = ws_stream.split();

        info!("Connected to {}", url);
        let resync = self.machine.connected();
        self.emit(AgentEvent::StateChanged(ConnectionState::Connected));

        if let Err(e) = send_message(&mut write, &resync).await {
            warn!("Failed to request list: {:#}", e);
            return Ok(SessionEnd::Lost);
        }

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(AgentCommand::Send(message)) => {
                        if let Err(e) = send_message(&mut write, &message).await {
                            warn!("Connection lost while sending: {:#}", e);
                            self.emit(AgentEvent::Error(e.to_string()));
                            return Ok(SessionEnd::Lost);
                        }
                    }
                    Some(AgentCommand::Shutdown) | None => {
                        write.close().await.ok();
                        return Ok(SessionEnd::Shutdown);
                    }
                },

                frame = read.next() => {
                    let decoded = match frame {
                        Some(Ok(Message::Text(text))) => ServerMessage::decode(&text),
                        Some(Ok(Message::Binary(data))) => ServerMessage::decode_bytes(&data),
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Connection closed by server");
                            return Ok(SessionEnd::Lost);
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!("Connection lost: {}", e);
                            self.emit(AgentEvent::Error(e.to_string()));
                            return Ok(SessionEnd::Lost);
                        }
                    };

                    match decoded {
                        Ok(message) => {
                            let count = self.machine.receive(message);
                            debug!("Received list with {} items", count);
                            self.emit(AgentEvent::SnapshotReplaced(count));
                        }
                        Err(e) => warn!("Ignoring malformed frame from server: {}", e),
                    }
                }
            }
        }
    }

    fn set_disconnected(&self) {
        if self.machine.disconnected() {
            self.emit(AgentEvent::StateChanged(ConnectionState::Disconnected));
        }
    }

    /// Emit an event; dropped if nobody keeps up
    fn emit(&self, event: AgentEvent) {
        let _ = self.events.try_send(event);
    }
}

/// Discard queued sends until shutdown is requested
async fn drain_until_shutdown(commands: &mut mpsc::Receiver<AgentCommand>) {
    loop {
        match commands.recv().await {
            Some(AgentCommand::Send(message)) => {
                debug!("Dropping {:?} while disconnected", message);
            }
            Some(AgentCommand::Shutdown) | None => return,
        }
    }
}

/// Write one message as a text frame
async fn send_message<S>(write: &mut S, message: &ClientMessage) -> Result<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = message.encode()?;
    write.send(Message::Text(text)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(names: &[&str]) -> Vec<Item> {
        names.iter().map(|n| Item::new(*n)).collect()
    }

    #[test]
    fn test_new_machine_is_disconnected_and_empty() {
        let machine = ConnectionMachine::new();
        let view = machine.view();

        assert_eq!(view.state(), ConnectionState::Disconnected);
        assert!(!view.is_connected());
        assert!(view.snapshot().is_empty());
    }

    #[test]
    fn test_connected_requests_resync() {
        let machine = ConnectionMachine::new();
        let view = machine.view();

        machine.connecting();
        assert_eq!(view.state(), ConnectionState::Connecting);
        assert!(!view.is_connected());

        assert_eq!(machine.connected(), ClientMessage::GetShoppingList);
        assert_eq!(view.state(), ConnectionState::Connected);
        assert!(view.is_connected());
    }

    #[test]
    fn test_receive_replaces_snapshot() {
        let machine = ConnectionMachine::new();
        let view = machine.view();
        machine.connected();

        assert_eq!(machine.receive(ServerMessage::ShoppingList(items(&["Milk", "Bread"]))), 2);
        assert_eq!(view.snapshot().len(), 2);

        assert_eq!(machine.receive(ServerMessage::ShoppingList(items(&["Eggs"]))), 1);
        let snapshot = view.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name(), "Eggs");
    }

    #[test]
    fn test_disconnect_keeps_last_snapshot() {
        let machine = ConnectionMachine::new();
        let view = machine.view();
        machine.connected();
        machine.receive(ServerMessage::ShoppingList(items(&["Milk"])));

        assert!(machine.disconnected());
        assert!(!view.is_connected());
        assert_eq!(view.state(), ConnectionState::Disconnected);
        assert_eq!(view.snapshot()[0].name(), "Milk");
    }

    #[test]
    fn test_failed_is_terminal() {
        let machine = ConnectionMachine::new();
        let view = machine.view();

        assert!(machine.failed());
        assert!(!machine.connecting());
        assert!(!machine.disconnected());
        assert_eq!(view.state(), ConnectionState::Failed);
        assert!(!view.is_connected());
    }

    #[test]
    fn test_reconnect_requests_resync_again() {
        let machine = ConnectionMachine::new();
        machine.connected();
        machine.disconnected();
        machine.connecting();

        assert_eq!(machine.connected(), ClientMessage::GetShoppingList);
        assert!(machine.view().is_connected());
    }

    #[test]
    fn test_prepare_rejects_when_disconnected() {
        let machine = ConnectionMachine::new();
        let view = machine.view();

        let err = view
            .prepare(Intent::AddItem {
                name: "Milk".to_string(),
            })
            .unwrap_err();
        assert_eq!(err, AgentError::NotConnected { action: "add item" });
        assert!(err.to_string().starts_with("Cannot add item: no connection to server"));

        let err = view
            .prepare(Intent::ToggleItem {
                id: "1".to_string(),
            })
            .unwrap_err();
        assert!(err.to_string().starts_with("Cannot toggle item"));

        let err = view
            .prepare(Intent::DeleteItem {
                id: "1".to_string(),
            })
            .unwrap_err();
        assert!(err.to_string().starts_with("Cannot delete item"));
    }

    #[test]
    fn test_prepare_validates_before_connectivity() {
        let machine = ConnectionMachine::new();
        let view = machine.view();

        let err = view
            .prepare(Intent::AddItem {
                name: "  ".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));

        machine.connected();
        let err = view
            .prepare(Intent::DeleteItem { id: String::new() })
            .unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }

    #[test]
    fn test_prepare_trims_name_when_connected() {
        let machine = ConnectionMachine::new();
        let view = machine.view();
        machine.connected();

        let message = view
            .prepare(Intent::AddItem {
                name: "  Milk ".to_string(),
            })
            .unwrap();
        assert_eq!(
            message,
            ClientMessage::AddItem {
                name: "Milk".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let machine = ConnectionMachine::new();
        let mut connectivity = machine.view().subscribe_connectivity();
        let mut snapshot = machine.view().subscribe_snapshot();

        machine.connected();
        connectivity.changed().await.unwrap();
        assert!(*connectivity.borrow_and_update());

        machine.receive(ServerMessage::ShoppingList(items(&["Milk"])));
        snapshot.changed().await.unwrap();
        assert_eq!(snapshot.borrow_and_update().len(), 1);
    }

    #[test]
    fn test_agent_config_from_config() {
        let mut config = Config::default();
        config.server_url = "ws://example.test:4000".to_string();
        config.reconnect.max_attempts = 2;

        let agent_config = AgentConfig::from_config(&config);
        assert_eq!(agent_config.url, "ws://example.test:4000");
        assert_eq!(agent_config.policy.max_attempts, 2);
        assert_eq!(agent_config.connect_timeout, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_without_retries() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config =
            AgentConfig::new(format!("ws://{}", addr)).with_policy(ReconnectPolicy::never());
        let mut agent = SyncAgent::spawn(config);
        let mut events = agent.take_events().unwrap();
        let mut state = agent.subscribe_state();

        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == ConnectionState::Failed),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(!agent.is_connected());
        assert!(agent.take_events().is_none());

        let saw_failed = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = events.recv().await {
                if event == AgentEvent::ReconnectFailed {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(saw_failed);

        let err = agent.add_item("Milk").await.unwrap_err();
        assert!(err.is_connectivity());
        agent.shutdown().await;
    }
}
