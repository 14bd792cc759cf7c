//! Data models for shoplist
//!
//! Defines the shopping list `Item`. Field names serialize in camelCase so the
//! same representation is used on the wire and in the persisted blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry on the shared shopping list
///
/// `id` and `created_at` are fixed at construction. `completed` can only be
/// flipped through the list store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    id: String,
    name: String,
    completed: bool,
    created_at: DateTime<Utc>,
}

impl Item {
    /// Create a new, not yet completed item with a fresh unique ID
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            completed: false,
            created_at: Utc::now(),
        }
    }

    /// Rebuild an item from known field values (for loading and tests)
    pub fn with_fields(
        id: impl Into<String>,
        name: impl Into<String>,
        completed: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            completed,
            created_at,
        }
    }

    /// Opaque unique identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the item has been ticked off
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// When the item was added
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Flip the completed flag, returning the new value
    pub(crate) fn toggle(&mut self) -> bool {
        self.completed = !self.completed;
        self.completed
    }
}

/// Returns true if `name` is acceptable as an item name
pub fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty()
}
