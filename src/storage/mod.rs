//! Persistence of the registry and event store
//!
//! The tracker persists two collections, repositories and events, both keyed
//! by repository id. Every operation loads fresh state through a
//! [`StateStore`], mutates a local copy and saves it back; nothing is cached
//! between calls.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{EventMap, RepositoryMap};

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// Errors raised by a state store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed {collection} document: {source}")]
    Malformed {
        collection: &'static str,
        source: serde_json::Error,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Load/save contract for the two persisted collections.
///
/// Loads return an empty mapping when no backing data exists yet. Saves
/// replace the whole collection (last writer wins).
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_repositories(&self) -> Result<RepositoryMap, StorageError>;

    async fn save_repositories(&self, repositories: &RepositoryMap) -> Result<(), StorageError>;

    async fn load_events(&self) -> Result<EventMap, StorageError>;

    async fn save_events(&self, events: &EventMap) -> Result<(), StorageError>;
}
