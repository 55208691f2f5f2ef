//! Stored event records
//!
//! Events are kept per repository as an [`EventCollection`]. Records are
//! immutable once stored; collections are only changed by the ingestion merge
//! and retention steps.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::models::repository::RepositoryId;

/// Persisted event store: repository id to its collection.
pub type EventMap = BTreeMap<RepositoryId, EventCollection>;

/// Upstream timestamp layout, UTC with second precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A single upstream event as stored by the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EventRecord {
    /// Upstream event id, unique within a repository's stream
    #[serde(deserialize_with = "deserialize_event_id")]
    pub id: u64,
    /// Event type, e.g. `PushEvent`
    #[serde(rename = "type")]
    pub kind: String,
    /// Creation time (UTC, second precision)
    #[serde(with = "second_precision")]
    #[schema(value_type = String, example = "2024-05-01T12:00:00Z")]
    pub created_at: DateTime<Utc>,
    /// `owner/name` as reported by the upstream event
    pub repo_name: String,
}

/// Ordered, duplicate-free events for one repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCollection(pub(crate) Vec<EventRecord>);

impl EventCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EventRecord> {
        self.0.iter()
    }

    /// Timestamp of the oldest stored event, if any
    pub fn oldest_created_at(&self) -> Option<DateTime<Utc>> {
        self.0.iter().map(|event| event.created_at).min()
    }
}

impl From<Vec<EventRecord>> for EventCollection {
    fn from(events: Vec<EventRecord>) -> Self {
        Self(events)
    }
}

impl<'a> IntoIterator for &'a EventCollection {
    type Item = &'a EventRecord;
    type IntoIter = std::slice::Iter<'a, EventRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The public events API sends ids as JSON strings; older stores hold integers.
pub(crate) fn deserialize_event_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

pub(crate) mod second_precision {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT) {
            return Ok(naive.and_utc());
        }
        DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
