//! Storage layer for shoplist
//!
//! The list snapshot is written as a single JSON blob after every change.
//! Persistence is best effort: the in-memory list stays authoritative when a
//! save fails.

mod error;
mod persistence;

pub use error::{StorageError, StorageResult};
pub use persistence::{DurableStore, JsonFileStore, MemoryStore};
