//! In-process state store
//!
//! Used by tests and by embedders that do not want files on disk. It counts
//! writes per collection and can be told to reject event writes.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{StateStore, StorageError};
use crate::models::{EventMap, RepositoryMap};

#[derive(Debug, Default)]
pub struct MemoryStore {
    repositories: Mutex<RepositoryMap>,
    events: Mutex<EventMap>,
    repository_writes: AtomicUsize,
    event_writes: AtomicUsize,
    fail_event_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with the given state. Seeding does not count as a write.
    pub fn with_state(repositories: RepositoryMap, events: EventMap) -> Self {
        Self {
            repositories: Mutex::new(repositories),
            events: Mutex::new(events),
            ..Self::default()
        }
    }

    /// Make every subsequent `save_events` fail.
    pub fn fail_event_writes(&self, fail: bool) {
        self.fail_event_writes.store(fail, Ordering::SeqCst);
    }

    pub fn repository_writes(&self) -> usize {
        self.repository_writes.load(Ordering::SeqCst)
    }

    pub fn event_writes(&self) -> usize {
        self.event_writes.load(Ordering::SeqCst)
    }

    pub fn repositories_snapshot(&self) -> RepositoryMap {
        lock(&self.repositories).clone()
    }

    pub fn events_snapshot(&self) -> EventMap {
        lock(&self.events).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_repositories(&self) -> Result<RepositoryMap, StorageError> {
        Ok(lock(&self.repositories).clone())
    }

    async fn save_repositories(&self, repositories: &RepositoryMap) -> Result<(), StorageError> {
        *lock(&self.repositories) = repositories.clone();
        self.repository_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_events(&self) -> Result<EventMap, StorageError> {
        Ok(lock(&self.events).clone())
    }

    async fn save_events(&self, events: &EventMap) -> Result<(), StorageError> {
        if self.fail_event_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "event writes disabled".to_string(),
            ));
        }
        *lock(&self.events) = events.clone();
        self.event_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
