//! Page merge and continuation rule
//!
//! Appends unseen events of a fetched page to a repository's collection and
//! decides whether fetching older pages is still worthwhile.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::ingest::retention::RetentionPolicy;
use crate::models::{EventCollection, EventRecord};

/// Result of merging one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Events appended to the collection
    pub added: usize,
    /// Incoming events whose id was already stored
    pub duplicates: usize,
    /// Whether the next page should be fetched
    pub continue_paging: bool,
}

/// Merge `incoming` into `collection`.
///
/// Paging stops when the page was empty, when any incoming id was already
/// stored (the stream caught up with earlier data), or when the oldest stored
/// event already lies before the retention window.
pub fn merge_page(
    collection: &mut EventCollection,
    incoming: Vec<EventRecord>,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let page_was_empty = incoming.is_empty();
    let mut seen: HashSet<u64> = collection.iter().map(|event| event.id).collect();
    let mut added = 0;
    let mut duplicates = 0;

    for event in incoming {
        if seen.insert(event.id) {
            collection.0.push(event);
            added += 1;
        } else {
            duplicates += 1;
        }
    }

    let continue_paging = if page_was_empty || duplicates > 0 {
        false
    } else {
        collection
            .oldest_created_at()
            .is_none_or(|oldest| oldest >= policy.cutoff(now))
    };

    MergeOutcome {
        added,
        duplicates,
        continue_paging,
    }
}
