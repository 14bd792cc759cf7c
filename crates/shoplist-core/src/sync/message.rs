//! Sync protocol message types
//!
//! Every frame is a JSON object naming an event and carrying its payload:
//!
//! ```text
//! {"event": "addItem", "data": {"name": "Milk"}}
//! {"event": "getShoppingList"}
//! {"event": "shoppingList", "data": [{"id": "...", "name": "Milk", ...}]}
//! ```

use serde::{Deserialize, Serialize};

use super::error::GatewayError;
use crate::models::{is_valid_name, Item};

/// Messages sent from a client to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Append an item
    AddItem { name: String },
    /// Flip an item's completed flag
    ToggleItem { id: String },
    /// Remove an item
    DeleteItem { id: String },
    /// Ask for the current list
    GetShoppingList,
}

/// Messages sent from the server to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Full snapshot of the list
    ShoppingList(Vec<Item>),
}

impl ClientMessage {
    /// Encode message as a JSON text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode message from a JSON text frame
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Decode message from raw bytes
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl ServerMessage {
    /// Encode message as a JSON text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode message from a JSON text frame
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Decode message from raw bytes
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// The items carried by this message
    pub fn items(&self) -> &[Item] {
        match self {
            ServerMessage::ShoppingList(items) => items,
        }
    }
}

/// A client request that passed validation
///
/// This is what the gateway acts on. Names are trimmed and IDs are known to
/// be non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddItem { name: String },
    ToggleItem { id: String },
    DeleteItem { id: String },
    GetShoppingList,
}

impl TryFrom<ClientMessage> for Command {
    type Error = GatewayError;

    fn try_from(message: ClientMessage) -> Result<Self, Self::Error> {
        match message {
            ClientMessage::AddItem { name } => {
                if !is_valid_name(&name) {
                    return Err(GatewayError::Validation("item name is empty".to_string()));
                }
                Ok(Command::AddItem {
                    name: name.trim().to_string(),
                })
            }
            ClientMessage::ToggleItem { id } => Ok(Command::ToggleItem {
                id: require_id(id)?,
            }),
            ClientMessage::DeleteItem { id } => Ok(Command::DeleteItem {
                id: require_id(id)?,
            }),
            ClientMessage::GetShoppingList => Ok(Command::GetShoppingList),
        }
    }
}

fn require_id(id: String) -> Result<String, GatewayError> {
    if id.trim().is_empty() {
        Err(GatewayError::Validation("item id is empty".to_string()))
    } else {
        Ok(id)
    }
}
