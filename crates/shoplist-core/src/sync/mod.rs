//! Realtime sync between the server and its clients
//!
//! ## Protocol
//!
//! JSON text frames over WebSocket:
//! 1. Client connects; server sends the full list
//! 2. Client sends `addItem`, `toggleItem`, `deleteItem` or `getShoppingList`
//! 3. After every successful change the server sends the full list to all
//!    clients
//!
//! ## Usage
//!
//! ```ignore
//! // Server
//! let gateway = Gateway::new(ListStore::open(JsonFileStore::from_config(&config)));
//! SyncServer::bind(&config.bind_addr, gateway).await?.run().await?;
//!
//! // Client
//! let agent = SyncAgent::spawn(AgentConfig::from_config(&config));
//! agent.add_item("Milk").await?;
//! ```

mod agent;
mod error;
mod gateway;
mod message;
mod reconnect;
mod server;

pub use agent::{
    AgentConfig, AgentEvent, AgentView, ConnectionMachine, ConnectionState, Intent, SyncAgent,
};
pub use error::{AgentError, GatewayError};
pub use gateway::{
    outbox, Dispatch, Gateway, GatewayEvent, Outbox, SessionId, SessionState, OUTBOX_CAPACITY,
};
pub use message::{ClientMessage, Command, ServerMessage};
pub use reconnect::ReconnectPolicy;
pub use server::SyncServer;
