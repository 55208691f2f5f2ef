//! Bounded retention of stored events
//!
//! A collection is first cut to the newest `max_events` ids, then anything
//! outside the rolling window is dropped. The order matters: a record removed
//! by the count cut is never brought back by the time check.

use chrono::{DateTime, Duration, Utc};

use crate::models::EventCollection;

/// Count and age bounds applied after every merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Rolling window length in days
    pub window_days: u32,
    /// Maximum number of events kept per repository
    pub max_events: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            window_days: 7,
            max_events: 500,
        }
    }
}

impl RetentionPolicy {
    pub fn new(window_days: u32, max_events: usize) -> Self {
        Self {
            window_days,
            max_events,
        }
    }

    /// Oldest timestamp still inside the window at `now`
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.window_days))
    }

    pub fn is_within_window(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        created_at >= self.cutoff(now) && created_at <= now
    }

    /// Sort by id descending, truncate to `max_events`, then drop records outside
    /// `[now - window_days, now]`. Returns the number of records removed.
    pub fn apply(&self, collection: &mut EventCollection, now: DateTime<Utc>) -> usize {
        let before = collection.len();
        let events = &mut collection.0;

        events.sort_by(|a, b| b.id.cmp(&a.id));
        events.truncate(self.max_events);
        events.retain(|event| self.is_within_window(event.created_at, now));

        before - events.len()
    }
}
