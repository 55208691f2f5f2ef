//! Tracker service
//!
//! Entry point shared by the HTTP handlers and the background scheduler. All
//! operations that touch persisted state run under one async lock, since the
//! stores are read-modify-write without their own synchronization.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::instrument;

use crate::connectors::EventFeed;
use crate::error::TrackerError;
use crate::ingest::{IngestReport, IngestionEngine, RetentionPolicy};
use crate::models::{RepositoryDescriptor, RepositoryId, RepositoryMap};
use crate::registry::RepositoryRegistry;
use crate::statistics::{StatisticsEngine, StatisticsReport};
use crate::storage::StateStore;

pub struct Tracker {
    registry: RepositoryRegistry,
    ingestion: IngestionEngine,
    statistics: StatisticsEngine,
    state_lock: Mutex<()>,
}

impl Tracker {
    pub fn new(
        store: Arc<dyn StateStore>,
        feed: Arc<dyn EventFeed>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            registry: RepositoryRegistry::new(store.clone()),
            ingestion: IngestionEngine::new(store.clone(), feed, policy),
            statistics: StatisticsEngine::new(store),
            state_lock: Mutex::new(()),
        }
    }

    pub async fn list_repositories(&self) -> Result<RepositoryMap, TrackerError> {
        let _guard = self.state_lock.lock().await;
        self.registry.list().await
    }

    /// Register a repository. The returned registry is the one written by
    /// this call, read under the same lock.
    pub async fn add_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<(RepositoryId, RepositoryMap), TrackerError> {
        let _guard = self.state_lock.lock().await;
        self.registry.add(owner, name).await
    }

    pub async fn delete_repository(
        &self,
        repo_id: RepositoryId,
    ) -> Result<RepositoryDescriptor, TrackerError> {
        let _guard = self.state_lock.lock().await;
        self.registry.delete(repo_id).await
    }

    /// Run one ingestion cycle.
    pub async fn fetch_events(&self) -> Result<IngestReport, TrackerError> {
        let _guard = self.state_lock.lock().await;
        self.ingestion.run_cycle().await
    }

    /// Refresh the event store, then compute statistics over it. Any ingestion
    /// failure is returned instead of statistics.
    #[instrument(skip_all)]
    pub async fn refresh_statistics(&self) -> Result<StatisticsReport, TrackerError> {
        let _guard = self.state_lock.lock().await;
        self.ingestion.run_cycle().await?;
        self.statistics.compute().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::{FeedError, FeedPage, PageRequest};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every request with an empty 200 page after a short pause.
    #[derive(Default)]
    struct SlowEmptyFeed {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl EventFeed for SlowEmptyFeed {
        fn events_url(&self, repository: &RepositoryDescriptor) -> String {
            format!("https://feed.test/{}", repository.full_name())
        }

        async fn fetch_page(&self, _request: PageRequest) -> Result<FeedPage, FeedError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(FeedPage {
                status: 200,
                ..FeedPage::default()
            })
        }
    }

    #[tokio::test]
    async fn concurrent_cycles_are_serialized() {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(SlowEmptyFeed::default());
        let tracker = Arc::new(Tracker::new(store, feed.clone(), RetentionPolicy::default()));
        tracker.add_repository("octo", "demo").await.unwrap();

        let a = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.fetch_events().await }
        });
        let b = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.refresh_statistics().await }
        });
        a.await.unwrap().unwrap();
        let stats = b.await.unwrap().unwrap();

        assert_eq!(feed.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(stats["octo/demo"].events_count, 0);
    }

    #[tokio::test]
    async fn statistics_surface_ingestion_failure() {
        let store = Arc::new(MemoryStore::new());
        let tracker = Tracker::new(
            store,
            Arc::new(SlowEmptyFeed::default()),
            RetentionPolicy::default(),
        );

        let err = tracker.refresh_statistics().await.unwrap_err();
        assert!(matches!(err, TrackerError::NoRepositoriesConfigured));
    }
}
