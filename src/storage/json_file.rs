//! JSON document store
//!
//! Keeps each collection in its own pretty-printed JSON file. Writes go to a
//! sibling temp file which is synced to disk and then renamed over the
//! target, so a crash leaves either the old or the new document, never a
//! truncated one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{StateStore, StorageError};
use crate::models::{EventMap, RepositoryMap};

/// File-backed [`StateStore`]
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    repositories_path: PathBuf,
    events_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(repositories_path: impl Into<PathBuf>, events_path: impl Into<PathBuf>) -> Self {
        Self {
            repositories_path: repositories_path.into(),
            events_path: events_path.into(),
        }
    }

    pub fn repositories_path(&self) -> &Path {
        &self.repositories_path
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }
}

async fn read_document<T>(path: &Path, collection: &'static str) -> Result<T, StorageError>
where
    T: DeserializeOwned + Default,
{
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), collection, "no document yet, starting empty");
            return Ok(T::default());
        }
        Err(source) => {
            return Err(StorageError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(&bytes).map_err(|source| StorageError::Malformed { collection, source })
}

async fn write_document<T>(
    path: &Path,
    collection: &'static str,
    value: &T,
) -> Result<(), StorageError>
where
    T: Serialize,
{
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|source| StorageError::Malformed { collection, source })?;

    let write_err = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let temp_path = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(write_err)?;
    file.write_all(&buffer).await.map_err(write_err)?;
    file.sync_all().await.map_err(write_err)?;
    drop(file);
    tokio::fs::rename(&temp_path, path).await.map_err(write_err)?;

    debug!(path = %path.display(), collection, bytes = buffer.len(), "document saved");
    Ok(())
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load_repositories(&self) -> Result<RepositoryMap, StorageError> {
        read_document(&self.repositories_path, "repositories").await
    }

    async fn save_repositories(&self, repositories: &RepositoryMap) -> Result<(), StorageError> {
        write_document(&self.repositories_path, "repositories", repositories).await
    }

    async fn load_events(&self) -> Result<EventMap, StorageError> {
        read_document(&self.events_path, "events").await
    }

    async fn save_events(&self, events: &EventMap) -> Result<(), StorageError> {
        write_document(&self.events_path, "events", events).await
    }
}
