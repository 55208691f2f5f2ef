//! Repository registry
//!
//! Bounded set of tracked repositories. Ids are allocated as one past the
//! largest id in use, so ids freed at the top of the range are reused.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::error::TrackerError;
use crate::models::{
    MAX_REPOSITORIES, RepositoryDescriptor, RepositoryId, RepositoryMap, next_repository_id,
};
use crate::storage::{StateStore, StorageError};

pub struct RepositoryRegistry {
    store: Arc<dyn StateStore>,
}

impl RepositoryRegistry {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<RepositoryMap, TrackerError> {
        Ok(self.store.load_repositories().await?)
    }

    /// Register `owner/name` and return its id with the updated registry.
    /// Capacity is checked before duplicates.
    #[instrument(skip(self))]
    pub async fn add(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<(RepositoryId, RepositoryMap), TrackerError> {
        let mut repositories = self.store.load_repositories().await?;

        if repositories.len() >= MAX_REPOSITORIES {
            return Err(TrackerError::CapacityExceeded {
                limit: MAX_REPOSITORIES,
            });
        }
        if repositories
            .values()
            .any(|existing| existing.is_same_repository(owner, name))
        {
            return Err(TrackerError::DuplicateRepository {
                owner: owner.to_string(),
                name: name.to_string(),
            });
        }

        let repo_id = next_repository_id(&repositories);
        let descriptor = RepositoryDescriptor::new(owner, name);
        info!(repo_id, repository = %descriptor.full_name(), "repository added");
        repositories.insert(repo_id, descriptor);
        self.store.save_repositories(&repositories).await?;

        Ok((repo_id, repositories))
    }

    /// Remove a repository and then its stored events.
    ///
    /// The registry write happens first. If the events cannot be removed
    /// afterwards the repository stays deleted and
    /// [`TrackerError::PartialDeletion`] carries the removed descriptor.
    #[instrument(skip(self))]
    pub async fn delete(&self, repo_id: RepositoryId) -> Result<RepositoryDescriptor, TrackerError> {
        let mut repositories = self.store.load_repositories().await?;
        let deleted = repositories
            .remove(&repo_id)
            .ok_or(TrackerError::NotFound { repo_id })?;
        self.store.save_repositories(&repositories).await?;
        info!(repo_id, repository = %deleted.full_name(), "repository removed");

        let cascade = async {
            let mut events = self.store.load_events().await?;
            if events.remove(&repo_id).is_some() {
                self.store.save_events(&events).await?;
            }
            Ok::<(), StorageError>(())
        };

        if let Err(source) = cascade.await {
            warn!(repo_id, error = %source, "stored events could not be removed");
            return Err(TrackerError::PartialDeletion {
                repo_id,
                deleted,
                source,
            });
        }

        Ok(deleted)
    }
}
