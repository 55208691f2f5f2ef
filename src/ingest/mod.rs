//! Ingestion engine
//!
//! One ingestion cycle walks every registered repository in id order:
//!
//! 1. Fetch the first events page, conditional on the stored cache token when
//!    the repository already has stored events.
//! 2. `304` leaves the repository untouched. Any other non-`200` status aborts
//!    the whole cycle. `200` stores the new token and merges the page.
//! 3. Follow `next` links while the merge asks for more, up to
//!    [`PAGE_CEILING`] pages. A failing later page only ends paging for that
//!    repository.
//! 4. Apply retention and persist the event store before moving on.
//!
//! The registry (with the refreshed cache tokens) is saved once the loop
//! completes without a fatal error.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, histogram};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::connectors::{EventFeed, PageRequest};
use crate::error::TrackerError;
use crate::models::{EventMap, RepositoryDescriptor, RepositoryId};
use crate::storage::StateStore;

pub mod merge;
pub mod retention;

pub use merge::{MergeOutcome, merge_page};
pub use retention::RetentionPolicy;

/// Maximum number of page requests per repository per cycle
pub const PAGE_CEILING: u32 = 5;

/// How a repository fared in a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Upstream reported no change since the cached token
    NotModified,
    /// At least the first page was fetched and merged
    Updated,
}

/// Per-repository summary of a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RepositoryIngest {
    /// `owner/name`
    pub repository: String,
    pub outcome: IngestOutcome,
    /// Page requests issued
    pub pages_fetched: u32,
    /// New events merged before retention
    pub events_added: usize,
    /// Events kept after retention
    pub events_stored: usize,
    /// A later page failed and paging ended early
    pub incomplete: bool,
}

/// Summary of a full ingestion cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct IngestReport {
    pub message: String,
    #[schema(value_type = Object)]
    pub repositories: BTreeMap<RepositoryId, RepositoryIngest>,
}

/// Runs ingestion cycles against a state store and an upstream feed
pub struct IngestionEngine {
    store: Arc<dyn StateStore>,
    feed: Arc<dyn EventFeed>,
    policy: RetentionPolicy,
}

impl IngestionEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        feed: Arc<dyn EventFeed>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            feed,
            policy,
        }
    }

    /// Run one cycle over every registered repository.
    ///
    /// Fails fast with [`TrackerError::NoRepositoriesConfigured`] before any
    /// write when the registry is empty, and with
    /// [`TrackerError::UpstreamRejected`] when a first page is refused.
    #[instrument(skip_all)]
    pub async fn run_cycle(&self) -> Result<IngestReport, TrackerError> {
        let started = Instant::now();

        let mut repositories = self.store.load_repositories().await?;
        if repositories.is_empty() {
            return Err(TrackerError::NoRepositoriesConfigured);
        }
        let mut events = self.store.load_events().await?;

        let mut report = IngestReport {
            message: "Repository events stored".to_string(),
            repositories: BTreeMap::new(),
        };

        for (repo_id, descriptor) in repositories.iter_mut() {
            let summary = self
                .ingest_repository(*repo_id, descriptor, &mut events)
                .await?;
            report.repositories.insert(*repo_id, summary);
        }

        self.store.save_repositories(&repositories).await?;

        let elapsed = started.elapsed();
        histogram!("tracker_ingest_cycle_duration_ms").record(elapsed.as_secs_f64() * 1_000.0);
        info!(
            repositories = report.repositories.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "ingestion cycle completed"
        );

        Ok(report)
    }

    #[instrument(skip(self, descriptor, events), fields(repository = %descriptor.full_name()))]
    async fn ingest_repository(
        &self,
        repo_id: RepositoryId,
        descriptor: &mut RepositoryDescriptor,
        events: &mut EventMap,
    ) -> Result<RepositoryIngest, TrackerError> {
        let has_stored_events = events
            .get(&repo_id)
            .is_some_and(|collection| !collection.is_empty());
        let conditional = descriptor
            .cache_token
            .clone()
            .filter(|_| has_stored_events);

        let first_request = PageRequest::first(self.feed.events_url(descriptor), conditional);
        let first = self
            .feed
            .fetch_page(first_request)
            .await
            .map_err(|source| TrackerError::UpstreamUnreachable { repo_id, source })?;
        counter!("tracker_pages_fetched_total").increment(1);

        if first.is_not_modified() {
            counter!("tracker_not_modified_total").increment(1);
            info!(repo_id, "nothing changed upstream");
            return Ok(RepositoryIngest {
                repository: descriptor.full_name(),
                outcome: IngestOutcome::NotModified,
                pages_fetched: 1,
                events_added: 0,
                events_stored: events.get(&repo_id).map_or(0, |c| c.len()),
                incomplete: false,
            });
        }

        if !first.is_ok() {
            warn!(repo_id, status = first.status, "first page rejected, aborting cycle");
            return Err(TrackerError::UpstreamRejected {
                repo_id,
                status: first.status,
                message: first.message.unwrap_or_default(),
            });
        }

        descriptor.cache_token = first.etag;
        let last_link = first.links.last;
        let mut next_link = first.links.next;

        let collection = events.entry(repo_id).or_default();
        let merged = merge_page(collection, first.events, &self.policy, Utc::now());
        let mut events_added = merged.added;
        let mut continue_paging = merged.continue_paging;
        let mut pages_fetched = 1;
        let mut incomplete = false;

        while continue_paging && pages_fetched < PAGE_CEILING {
            let Some(url) = next_link.take() else {
                break;
            };

            let page = match self.feed.fetch_page(PageRequest::follow(url.clone())).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(repo_id, page = pages_fetched + 1, error = %err, "page fetch failed, ending pagination");
                    counter!("tracker_page_stops_total").increment(1);
                    incomplete = true;
                    break;
                }
            };
            pages_fetched += 1;
            counter!("tracker_pages_fetched_total").increment(1);

            if !page.is_ok() {
                warn!(
                    repo_id,
                    page = pages_fetched,
                    status = page.status,
                    upstream_message = page.message.as_deref().unwrap_or_default(),
                    "page rejected, ending pagination"
                );
                counter!("tracker_page_stops_total").increment(1);
                incomplete = true;
                break;
            }

            let merged = merge_page(collection, page.events, &self.policy, Utc::now());
            events_added += merged.added;
            continue_paging = merged.continue_paging;

            next_link = if last_link.as_deref().is_some_and(|last| last != url) {
                page.links.next
            } else {
                None
            };
        }

        let removed = self.policy.apply(collection, Utc::now());
        let events_stored = collection.len();
        counter!("tracker_events_merged_total").increment(events_added as u64);
        debug!(
            repo_id,
            pages_fetched, events_added, removed, events_stored, "repository merged"
        );

        self.store.save_events(events).await?;

        Ok(RepositoryIngest {
            repository: descriptor.full_name(),
            outcome: IngestOutcome::Updated,
            pages_fetched,
            events_added,
            events_stored,
            incomplete,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::{FeedError, FeedPage, PageLinks};
    use crate::models::{EventCollection, EventRecord, RepositoryMap};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Feed replaying canned pages in order and recording every request.
    #[derive(Default)]
    struct ScriptedFeed {
        responses: Mutex<VecDeque<Result<FeedPage, FeedError>>>,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl ScriptedFeed {
        fn with_pages(pages: Vec<FeedPage>) -> Arc<Self> {
            Self::with_responses(pages.into_iter().map(Ok).collect())
        }

        fn with_responses(responses: Vec<Result<FeedPage, FeedError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<PageRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventFeed for ScriptedFeed {
        fn events_url(&self, repository: &RepositoryDescriptor) -> String {
            format!("https://feed.test/repos/{}/events", repository.full_name())
        }

        async fn fetch_page(&self, request: PageRequest) -> Result<FeedPage, FeedError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("feed ran out of scripted pages")
        }
    }

    fn recent(minutes: i64) -> DateTime<Utc> {
        Utc::now() - Duration::minutes(minutes)
    }

    fn event(id: u64, created_at: DateTime<Utc>) -> EventRecord {
        EventRecord {
            id,
            kind: "PushEvent".to_string(),
            created_at,
            repo_name: "octo/demo".to_string(),
        }
    }

    fn ok_page(ids: std::ops::RangeInclusive<u64>, next: Option<u32>, last: Option<u32>) -> FeedPage {
        FeedPage {
            status: 200,
            etag: Some("\"etag-1\"".to_string()),
            links: PageLinks {
                next: next.map(|n| format!("https://feed.test/page/{}", n)),
                last: last.map(|n| format!("https://feed.test/page/{}", n)),
            },
            events: ids.rev().map(|id| event(id, recent(id as i64))).collect(),
            message: None,
        }
    }

    fn status_page(status: u16) -> FeedPage {
        FeedPage {
            status,
            message: Some("nope".to_string()),
            ..FeedPage::default()
        }
    }

    fn registry(tokens: &[Option<&str>]) -> RepositoryMap {
        tokens
            .iter()
            .enumerate()
            .map(|(i, token)| {
                let mut descriptor = RepositoryDescriptor::new("octo", format!("repo{}", i));
                descriptor.cache_token = token.map(str::to_string);
                (i as RepositoryId, descriptor)
            })
            .collect()
    }

    fn engine(store: Arc<MemoryStore>, feed: Arc<ScriptedFeed>) -> IngestionEngine {
        IngestionEngine::new(store, feed, RetentionPolicy::new(7, 500))
    }

    #[tokio::test]
    async fn empty_registry_fails_without_writes() {
        let store = Arc::new(MemoryStore::new());
        let feed = ScriptedFeed::with_pages(Vec::new());

        let err = engine(store.clone(), feed.clone()).run_cycle().await.unwrap_err();

        assert!(matches!(err, TrackerError::NoRepositoriesConfigured));
        assert_eq!(store.repository_writes(), 0);
        assert_eq!(store.event_writes(), 0);
        assert!(feed.requests().is_empty());
    }

    #[tokio::test]
    async fn first_cycle_fetches_unconditionally_and_stores_token() {
        let store = Arc::new(MemoryStore::with_state(
            registry(&[Some("\"stale\"")]),
            EventMap::new(),
        ));
        let feed = ScriptedFeed::with_pages(vec![ok_page(1..=3, None, None)]);

        let report = engine(store.clone(), feed.clone()).run_cycle().await.unwrap();

        let requests = feed.requests();
        assert_eq!(requests.len(), 1);
        // Token exists but no events are stored yet, so the fetch is unconditional.
        assert_eq!(requests[0].if_none_match, None);
        assert_eq!(requests[0].page, Some(1));

        let repos = store.repositories_snapshot();
        assert_eq!(repos[&0].cache_token.as_deref(), Some("\"etag-1\""));
        let events = store.events_snapshot();
        let ids: Vec<u64> = events[&0].iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(report.repositories[&0].events_added, 3);
        assert_eq!(report.repositories[&0].outcome, IngestOutcome::Updated);
    }

    #[tokio::test]
    async fn not_modified_leaves_collection_and_token_untouched() {
        let stored = EventCollection::from(vec![event(10, recent(5))]);
        let mut events = EventMap::new();
        events.insert(0, stored.clone());
        let store = Arc::new(MemoryStore::with_state(registry(&[Some("\"cached\"")]), events));
        let feed = ScriptedFeed::with_pages(vec![status_page(304)]);

        let report = engine(store.clone(), feed.clone()).run_cycle().await.unwrap();

        assert_eq!(
            feed.requests()[0].if_none_match.as_deref(),
            Some("\"cached\"")
        );
        assert_eq!(report.repositories[&0].outcome, IngestOutcome::NotModified);
        assert_eq!(store.events_snapshot()[&0], stored);
        assert_eq!(store.event_writes(), 0);
        assert_eq!(
            store.repositories_snapshot()[&0].cache_token.as_deref(),
            Some("\"cached\"")
        );
    }

    #[tokio::test]
    async fn rejected_first_page_aborts_cycle_but_keeps_earlier_progress() {
        let store = Arc::new(MemoryStore::with_state(
            registry(&[None, None, None]),
            EventMap::new(),
        ));
        let feed = ScriptedFeed::with_pages(vec![ok_page(1..=2, None, None), status_page(403)]);

        let err = engine(store.clone(), feed.clone()).run_cycle().await.unwrap_err();

        match err {
            TrackerError::UpstreamRejected {
                repo_id, status, ..
            } => {
                assert_eq!(repo_id, 1);
                assert_eq!(status, 403);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The third repository is never requested.
        assert_eq!(feed.requests().len(), 2);
        // Repository 0 was persisted; the registry (tokens) was not.
        assert_eq!(store.events_snapshot()[&0].len(), 2);
        assert_eq!(store.repository_writes(), 0);
    }

    #[tokio::test]
    async fn later_page_failure_only_ends_that_repository() {
        let store = Arc::new(MemoryStore::with_state(registry(&[None, None]), EventMap::new()));
        let feed = ScriptedFeed::with_pages(vec![
            ok_page(5..=6, Some(2), Some(3)),
            status_page(502),
            ok_page(1..=1, None, None),
        ]);

        let report = engine(store.clone(), feed.clone()).run_cycle().await.unwrap();

        let first = &report.repositories[&0];
        assert!(first.incomplete);
        assert_eq!(first.pages_fetched, 2);
        assert_eq!(first.events_stored, 2);
        assert_eq!(report.repositories[&1].events_stored, 1);
        assert_eq!(store.repository_writes(), 1);

        let requests = feed.requests();
        assert_eq!(requests[1].url, "https://feed.test/page/2");
        assert_eq!(requests[1].page, None);
        assert_eq!(requests[1].if_none_match, None);
    }

    #[tokio::test]
    async fn later_page_transport_error_moves_on_to_next_repository() {
        let store = Arc::new(MemoryStore::with_state(registry(&[None, None]), EventMap::new()));
        let broken_body = serde_json::from_str::<serde_json::Value>("[{").unwrap_err();
        let feed = ScriptedFeed::with_responses(vec![
            Ok(ok_page(7..=9, Some(2), Some(4))),
            Err(FeedError::Decode(broken_body)),
            Ok(ok_page(1..=2, None, None)),
        ]);

        let report = engine(store.clone(), feed.clone()).run_cycle().await.unwrap();

        let first = &report.repositories[&0];
        assert!(first.incomplete);
        assert_eq!(first.pages_fetched, 1);
        assert_eq!(first.events_stored, 3);

        let second = &report.repositories[&1];
        assert!(!second.incomplete);
        assert_eq!(second.events_stored, 2);

        assert_eq!(feed.requests().len(), 3);
        let events = store.events_snapshot();
        assert_eq!(events[&0].len(), 3);
        assert_eq!(events[&1].len(), 2);
        assert_eq!(
            store.repositories_snapshot()[&0].cache_token.as_deref(),
            Some("\"etag-1\"")
        );
    }

    #[tokio::test]
    async fn paging_is_capped_at_five_pages() {
        let store = Arc::new(MemoryStore::with_state(registry(&[None]), EventMap::new()));
        let feed = ScriptedFeed::with_pages(vec![
            ok_page(61..=70, Some(2), Some(9)),
            ok_page(51..=60, Some(3), Some(9)),
            ok_page(41..=50, Some(4), Some(9)),
            ok_page(31..=40, Some(5), Some(9)),
            ok_page(21..=30, Some(6), Some(9)),
            ok_page(11..=20, Some(7), Some(9)),
        ]);

        let report = engine(store.clone(), feed.clone()).run_cycle().await.unwrap();

        assert_eq!(feed.requests().len(), PAGE_CEILING as usize);
        assert_eq!(report.repositories[&0].pages_fetched, PAGE_CEILING);
        assert_eq!(store.events_snapshot()[&0].len(), 50);
    }

    #[tokio::test]
    async fn paging_stops_after_fetching_the_last_link() {
        let store = Arc::new(MemoryStore::with_state(registry(&[None]), EventMap::new()));
        let feed = ScriptedFeed::with_pages(vec![
            ok_page(21..=30, Some(2), Some(2)),
            ok_page(11..=20, Some(3), Some(3)),
        ]);

        let report = engine(store.clone(), feed.clone()).run_cycle().await.unwrap();

        assert_eq!(feed.requests().len(), 2);
        assert_eq!(report.repositories[&0].events_stored, 20);
    }

    #[tokio::test]
    async fn overlapping_page_stops_paging() {
        let mut events = EventMap::new();
        events.insert(0, EventCollection::from(vec![event(3, recent(30))]));
        let store = Arc::new(MemoryStore::with_state(registry(&[Some("\"old\"")]), events));
        let feed = ScriptedFeed::with_pages(vec![ok_page(3..=5, Some(2), Some(4))]);

        let report = engine(store.clone(), feed.clone()).run_cycle().await.unwrap();

        assert_eq!(feed.requests().len(), 1);
        assert_eq!(report.repositories[&0].events_added, 2);
        assert_eq!(store.events_snapshot()[&0].len(), 3);
    }

    #[tokio::test]
    async fn repeated_cycle_without_new_events_is_idempotent() {
        let store = Arc::new(MemoryStore::with_state(registry(&[None]), EventMap::new()));
        let feed = ScriptedFeed::with_pages(vec![
            ok_page(1..=4, None, None),
            ok_page(1..=4, None, None),
            ok_page(1..=4, None, None),
        ]);
        let engine = engine(store.clone(), feed);

        engine.run_cycle().await.unwrap();
        let after_first = serde_json::to_vec(&store.events_snapshot()).unwrap();
        let second = engine.run_cycle().await.unwrap();
        engine.run_cycle().await.unwrap();
        let after_third = serde_json::to_vec(&store.events_snapshot()).unwrap();

        assert_eq!(second.repositories[&0].events_added, 0);
        assert_eq!(after_first, after_third);
    }

    #[tokio::test]
    async fn retention_bounds_hold_after_cycle() {
        let store = Arc::new(MemoryStore::with_state(registry(&[None]), EventMap::new()));
        let mut page = ok_page(1..=6, None, None);
        page.events.push(event(100, Utc::now() - Duration::days(30)));
        let feed = ScriptedFeed::with_pages(vec![page]);

        IngestionEngine::new(store.clone(), feed, RetentionPolicy::new(7, 4))
            .run_cycle()
            .await
            .unwrap();

        let stored = &store.events_snapshot()[&0];
        let ids: Vec<u64> = stored.iter().map(|e| e.id).collect();
        // Count cut keeps 100, 6, 5, 4; the time cut then drops the stale 100.
        assert_eq!(ids, vec![6, 5, 4]);
    }
}
