//! Sync error types
//!
//! Gateway errors never leave the gateway: they are logged and the command is
//! dropped. Agent errors are returned to the caller of a mutation intent so
//! the presentation layer can show them.

use thiserror::Error;

/// Reasons the gateway ignores a client command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Payload failed validation
    #[error("Invalid command: {0}")]
    Validation(String),

    /// Target item does not exist (possibly deleted by another client)
    #[error("No item with id '{0}'")]
    NotFound(String),

    /// Command arrived for a session that is not registered
    #[error("Unknown session {0}")]
    UnknownSession(uuid::Uuid),
}

/// Errors returned by the client sync agent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// Not connected, so the intent was not sent
    #[error("Cannot {action}: no connection to server. Please check your internet connection.")]
    NotConnected { action: &'static str },

    /// Input rejected before sending
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The agent task has stopped
    #[error("Sync agent has shut down")]
    ChannelClosed,
}

impl AgentError {
    /// Whether this error means the server is unreachable
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            AgentError::NotConnected { .. } | AgentError::ChannelClosed
        )
    }
}
