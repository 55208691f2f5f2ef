//! Per-repository event timing statistics
//!
//! For every repository the stored events are grouped by type and the average
//! gap between consecutive events of a type is reported, together with the
//! total number of stored events.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::TrackerError;
use crate::models::{EventCollection, EventMap, RepositoryMap};
use crate::storage::StateStore;

/// Summary key holding the total event count of a repository
pub const EVENTS_COUNT_KEY: &str = "events_count";

/// Key used for an event type literally named [`EVENTS_COUNT_KEY`]
pub const SHADOWED_EVENTS_COUNT_KEY: &str = "events_count_event";

/// Average gap between consecutive events of one type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalSummary {
    /// Average in whole seconds, ties rounded to even
    pub seconds: i64,
    /// Rounded seconds expressed in hours, rounded to two decimals
    pub hours: f64,
}

impl IntervalSummary {
    fn from_average_seconds(average: f64) -> Self {
        let seconds = average.round_ties_even() as i64;
        Self {
            seconds,
            hours: round_hundredths(seconds as f64 / 3600.0),
        }
    }
}

/// Round to two decimals on the exact binary value, so `0.505` becomes
/// `0.51` and `0.015` (stored just below) becomes `0.01`.
fn round_hundredths(value: f64) -> f64 {
    format!("{value:.2}")
        .parse()
        .unwrap_or_else(|_| (value * 100.0).round() / 100.0)
}

impl fmt::Display for IntervalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `{:?}` keeps a trailing `.0` on whole hours.
        write!(f, "{} s (or {:?} h)", self.seconds, self.hours)
    }
}

impl Serialize for IntervalSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Statistics of one repository.
///
/// Serializes as a flat object: one key per event type (`null` for a type
/// with a single event) plus [`EVENTS_COUNT_KEY`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryStatistics {
    pub events_count: usize,
    pub intervals: BTreeMap<String, Option<IntervalSummary>>,
}

impl Serialize for RepositoryStatistics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.intervals.len() + 1))?;
        for (kind, summary) in &self.intervals {
            let key = if kind == EVENTS_COUNT_KEY {
                SHADOWED_EVENTS_COUNT_KEY
            } else {
                kind.as_str()
            };
            map.serialize_entry(key, summary)?;
        }
        map.serialize_entry(EVENTS_COUNT_KEY, &self.events_count)?;
        map.end()
    }
}

/// `owner/name` to repository statistics
pub type StatisticsReport = BTreeMap<String, RepositoryStatistics>;

/// Statistics of a single collection.
pub fn collection_statistics(collection: &EventCollection) -> RepositoryStatistics {
    let mut by_kind: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for event in collection {
        by_kind
            .entry(event.kind.as_str())
            .or_default()
            .push(event.created_at.timestamp());
    }

    let intervals = by_kind
        .into_iter()
        .map(|(kind, mut timestamps)| {
            timestamps.sort_unstable();
            (kind.to_string(), average_interval(&timestamps))
        })
        .collect();

    RepositoryStatistics {
        events_count: collection.len(),
        intervals,
    }
}

/// `timestamps` must be sorted ascending. `None` for fewer than two samples.
fn average_interval(timestamps: &[i64]) -> Option<IntervalSummary> {
    if timestamps.len() < 2 {
        return None;
    }
    let total: i64 = timestamps.windows(2).map(|pair| pair[1] - pair[0]).sum();
    let average = total as f64 / (timestamps.len() - 1) as f64;
    Some(IntervalSummary::from_average_seconds(average))
}

/// Statistics for every registered repository
pub fn compute_statistics(repositories: &RepositoryMap, events: &EventMap) -> StatisticsReport {
    let empty = EventCollection::new();
    repositories
        .iter()
        .map(|(repo_id, descriptor)| {
            let collection = events.get(repo_id).unwrap_or(&empty);
            (descriptor.full_name(), collection_statistics(collection))
        })
        .collect()
}

/// Reads fresh state from the store and computes statistics over it
pub struct StatisticsEngine {
    store: Arc<dyn StateStore>,
}

impl StatisticsEngine {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    #[instrument(skip_all)]
    pub async fn compute(&self) -> Result<StatisticsReport, TrackerError> {
        let repositories = self.store.load_repositories().await?;
        let events = self.store.load_events().await?;
        let report = compute_statistics(&repositories, &events);
        debug!(repositories = report.len(), "statistics computed");
        Ok(report)
    }
}
