//! Event feed trait definition
//!
//! Minimal fetch-page contract between the ingestion engine and an upstream
//! events API.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{EventRecord, RepositoryDescriptor};

/// HTTP status of a successful page
pub const STATUS_OK: u16 = 200;
/// HTTP status of an unchanged conditional fetch
pub const STATUS_NOT_MODIFIED: u16 = 304;

/// Transport-level failures. HTTP error statuses are not errors here; they are
/// reported through [`FeedPage::status`].
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to decode events page: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid page url: {0}")]
    Url(#[from] url::ParseError),
}

/// A single page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    /// Cache validator sent as `If-None-Match`
    pub if_none_match: Option<String>,
    /// Explicit page number; `None` fetches `url` exactly as given
    pub page: Option<u32>,
}

impl PageRequest {
    /// First page of a stream, optionally conditional on a cached validator
    pub fn first(url: impl Into<String>, if_none_match: Option<String>) -> Self {
        Self {
            url: url.into(),
            if_none_match,
            page: Some(1),
        }
    }

    /// Follow a pagination link verbatim, never conditional
    pub fn follow(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            if_none_match: None,
            page: None,
        }
    }
}

/// Pagination relation links of a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub next: Option<String>,
    pub last: Option<String>,
}

/// Result of a page fetch
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    pub status: u16,
    /// Cache validator of the response, if any
    pub etag: Option<String>,
    pub links: PageLinks,
    /// Decoded events; only populated for a 200 response
    pub events: Vec<EventRecord>,
    /// Response body for non-200 responses
    pub message: Option<String>,
}

impl FeedPage {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == STATUS_NOT_MODIFIED
    }
}

/// Upstream source of repository event pages
#[async_trait]
pub trait EventFeed: Send + Sync {
    /// URL of the first events page for a repository
    fn events_url(&self, repository: &RepositoryDescriptor) -> String;

    async fn fetch_page(&self, request: PageRequest) -> Result<FeedPage, FeedError>;
}
