//! Realtime gateway
//!
//! Routes client commands to the [`ListStore`] and fans the resulting list
//! out to every connected session. The gateway owns no list state of its own;
//! it holds the store and the set of session outboxes.
//!
//! ```text
//! Session A ──┐                          ┌──▶ Session A
//!             ├──▶ GatewayEvent queue ──▶ Gateway ──▶ ListStore
//! Session B ──┘          (one at a time)  └──▶ Session B
//! ```
//!
//! The gateway itself is synchronous. Callers feed it one event at a time,
//! which is what keeps mutations from interleaving.

use std::collections::HashMap;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::GatewayError;
use super::message::{ClientMessage, Command, ServerMessage};
use crate::models::Item;
use crate::store::ListStore;

/// Identifies one client connection
pub type SessionId = Uuid;

/// Queue of frames waiting to be written to a session's socket
pub type Outbox = mpsc::Sender<ServerMessage>;

/// Frames a session may have queued before it is dropped as stalled
///
/// Every frame is a full snapshot, so a dropped client loses nothing its
/// resync on reconnect does not restore.
pub const OUTBOX_CAPACITY: usize = 256;

/// Create a session outbox with the standard capacity
pub fn outbox() -> (Outbox, mpsc::Receiver<ServerMessage>) {
    mpsc::channel(OUTBOX_CAPACITY)
}

/// Lifecycle of a client session
///
/// A reconnecting client shows up as a brand new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered with the gateway and receiving broadcasts
    Connected,
    /// Gone; terminal
    Disconnected,
}

/// Input to the gateway, in arrival order
#[derive(Debug)]
pub enum GatewayEvent {
    /// A session finished its handshake
    Connected {
        session: SessionId,
        peer: Option<SocketAddr>,
        outbox: Outbox,
    },
    /// A session sent a command
    Inbound {
        session: SessionId,
        message: ClientMessage,
    },
    /// A session went away
    Disconnected { session: SessionId },
}

/// What the gateway did with a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The list changed and was sent to this many sessions
    Broadcast { recipients: usize },
    /// The list was sent to the requesting session only
    Replied,
}

/// A registered session
struct Session {
    outbox: Outbox,
    peer: Option<SocketAddr>,
    connected_at: DateTime<Utc>,
}

/// Session registry plus command routing
pub struct Gateway {
    store: ListStore,
    sessions: HashMap<SessionId, Session>,
}

impl Gateway {
    /// Create a gateway in front of `store`
    pub fn new(store: ListStore) -> Self {
        Self {
            store,
            sessions: HashMap::new(),
        }
    }

    /// Apply one event
    ///
    /// Command errors are logged here and go no further.
    pub fn apply(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Connected {
                session,
                peer,
                outbox,
            } => self.connect(session, peer, outbox),
            GatewayEvent::Inbound { session, message } => {
                if let Err(e) = self.handle(session, message) {
                    warn!("Ignoring command from {}: {}", session, e);
                }
            }
            GatewayEvent::Disconnected { session } => {
                self.disconnect(session);
            }
        }
    }

    /// Register a session and send it the current list
    pub fn connect(&mut self, session: SessionId, peer: Option<SocketAddr>, outbox: Outbox) {
        let snapshot = ServerMessage::ShoppingList(self.store.snapshot());
        if let Err(e) = outbox.try_send(snapshot) {
            debug!("Session {} not registered: {}", session, e);
            return;
        }

        self.sessions.insert(
            session,
            Session {
                outbox,
                peer,
                connected_at: Utc::now(),
            },
        );

        match peer {
            Some(addr) => info!("Client connected: {} ({})", session, addr),
            None => info!("Client connected: {}", session),
        }
    }

    /// Forget a session; returns whether it was registered
    pub fn disconnect(&mut self, session: SessionId) -> bool {
        match self.sessions.remove(&session) {
            Some(s) => {
                let duration = Utc::now() - s.connected_at;
                match s.peer {
                    Some(addr) => info!(
                        "Client disconnected: {} ({}) after {}s",
                        session,
                        addr,
                        duration.num_seconds()
                    ),
                    None => info!(
                        "Client disconnected: {} after {}s",
                        session,
                        duration.num_seconds()
                    ),
                }
                true
            }
            None => false,
        }
    }

    /// Validate and dispatch a raw client message
    pub fn handle(
        &mut self,
        session: SessionId,
        message: ClientMessage,
    ) -> Result<Dispatch, GatewayError> {
        if !self.sessions.contains_key(&session) {
            return Err(GatewayError::UnknownSession(session));
        }
        let command = Command::try_from(message)?;
        self.dispatch(session, command)
    }

    /// Run a validated command
    ///
    /// Successful mutations are broadcast to every session before this
    /// returns. Reads are answered to `session` only.
    pub fn dispatch(
        &mut self,
        session: SessionId,
        command: Command,
    ) -> Result<Dispatch, GatewayError> {
        match command {
            Command::AddItem { name } => {
                self.store
                    .add_item(&name)
                    .ok_or_else(|| GatewayError::Validation("item name is empty".to_string()))?;
            }
            Command::ToggleItem { id } => {
                if self.store.toggle_item(&id).is_none() {
                    return Err(GatewayError::NotFound(id));
                }
            }
            Command::DeleteItem { id } => {
                if self.store.delete_item(&id).is_none() {
                    return Err(GatewayError::NotFound(id));
                }
            }
            Command::GetShoppingList => {
                self.reply(session)?;
                return Ok(Dispatch::Replied);
            }
        }

        let recipients = self.broadcast();
        Ok(Dispatch::Broadcast { recipients })
    }

    /// Send the current list to every session
    ///
    /// Sessions whose outbox has closed or filled up are dropped from the
    /// registry. Returns the number of sessions that received the list.
    pub fn broadcast(&mut self) -> usize {
        let message = ServerMessage::ShoppingList(self.store.snapshot());

        self.sessions
            .retain(|id, session| deliver(*id, &session.outbox, message.clone()));

        debug!(
            "Broadcast {} items to {} sessions",
            message.items().len(),
            self.sessions.len()
        );
        self.sessions.len()
    }

    fn reply(&mut self, session: SessionId) -> Result<(), GatewayError> {
        let Some(target) = self.sessions.get(&session) else {
            return Err(GatewayError::UnknownSession(session));
        };

        let message = ServerMessage::ShoppingList(self.store.snapshot());
        if !deliver(session, &target.outbox, message) {
            self.sessions.remove(&session);
        }
        Ok(())
    }

    /// Copy of the current list
    pub fn snapshot(&self) -> Vec<Item> {
        self.store.snapshot()
    }

    /// Number of registered sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether `session` is registered
    pub fn has_session(&self, session: &SessionId) -> bool {
        self.sessions.contains_key(session)
    }

    /// Lifecycle state of a session as far as the gateway knows
    ///
    /// Sessions still in their handshake are not registered yet, so the
    /// gateway only ever reports `Connected` or `Disconnected`.
    pub fn session_state(&self, session: &SessionId) -> SessionState {
        if self.has_session(session) {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

}

/// Queue `message` for a session; false means the session should be dropped
fn deliver(session: SessionId, outbox: &Outbox, message: ServerMessage) -> bool {
    match outbox.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(
                "Dropping session {}: {} frames unread",
                session, OUTBOX_CAPACITY
            );
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Dropping closed session {}", session);
            false
        }
    }
}
