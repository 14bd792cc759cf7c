//! Shoplist Core Library
//!
//! This crate provides the core functionality for shoplist, a shared
//! shopping list kept in sync across clients in real time.
//!
//! # Architecture
//!
//! - **Server**: one authoritative list, written through to a JSON file
//!   after every change and pushed whole to every connected client
//! - **Client**: a sync agent mirroring the server's list, refusing changes
//!   while offline and reconnecting on its own
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let mut store = ListStore::open(JsonFileStore::from_config(&config));
//!
//! let milk = store.add_item("Milk").unwrap();
//! store.toggle_item(milk.id());
//!
//! let items = store.snapshot();
//! ```
//!
//! # Modules
//!
//! - `store`: Authoritative list (main entry point on the server)
//! - `models`: The shopping list item
//! - `storage`: Durable snapshot of the list
//! - `sync`: WebSocket server, gateway and client agent
//! - `config`: Application configuration

pub mod config;
pub mod models;
pub mod storage;
pub mod store;
pub mod sync;

pub use config::{Config, ReconnectConfig};
pub use models::Item;
pub use storage::{DurableStore, JsonFileStore, MemoryStore, StorageError, StorageResult};
pub use store::ListStore;
pub use sync::{
    AgentConfig, AgentError, AgentEvent, ConnectionState, Gateway, GatewayError, ReconnectPolicy,
    SyncAgent, SyncServer,
};
