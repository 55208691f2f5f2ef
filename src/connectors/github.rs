//! GitHub events connector
//!
//! Fetches the public events stream of a repository from the GitHub REST API,
//! with conditional requests (`ETag`/`If-None-Match`) and `Link` header
//! pagination.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, ETAG, IF_NONE_MATCH, LINK, USER_AGENT};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::connectors::trait_::{
    EventFeed, FeedError, FeedPage, PageLinks, PageRequest, STATUS_NOT_MODIFIED, STATUS_OK,
};
use crate::models::event::{deserialize_event_id, second_precision};
use crate::models::{EventRecord, RepositoryDescriptor};

/// Default REST API base
pub const DEFAULT_API_BASE: &str = "https://api.github.com";
/// Page size requested for explicitly numbered pages
pub const PAGE_SIZE: u32 = 100;

const ACCEPT_HEADER: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// GitHub API client configuration
#[derive(Debug, Clone)]
pub struct GitHubApiConfig {
    pub base_url: String,
    /// Personal token sent as `Authorization: token <value>`
    pub token: Option<String>,
}

impl Default for GitHubApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            token: None,
        }
    }
}

/// [`EventFeed`] backed by the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubEventsClient {
    client: reqwest::Client,
    api_config: GitHubApiConfig,
}

impl GitHubEventsClient {
    pub fn new(api_config: GitHubApiConfig) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, api_config })
    }

    /// Client against an explicit API base, e.g. a mock server
    pub fn with_api_base(base_url: impl Into<String>) -> Result<Self, FeedError> {
        Self::new(GitHubApiConfig {
            base_url: base_url.into(),
            token: None,
        })
    }

    fn build_url(&self, request: &PageRequest) -> Result<Url, FeedError> {
        let mut url = Url::parse(&request.url)?;
        if let Some(page) = request.page {
            url.query_pairs_mut()
                .append_pair("per_page", &PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());
        }
        Ok(url)
    }
}

#[async_trait]
impl EventFeed for GitHubEventsClient {
    fn events_url(&self, repository: &RepositoryDescriptor) -> String {
        format!(
            "{}/repos/{}/{}/events",
            self.api_config.base_url.trim_end_matches('/'),
            repository.owner,
            repository.name
        )
    }

    async fn fetch_page(&self, request: PageRequest) -> Result<FeedPage, FeedError> {
        let url = self.build_url(&request)?;

        let mut builder = self
            .client
            .get(url.clone())
            .header(ACCEPT, ACCEPT_HEADER)
            .header(API_VERSION_HEADER, API_VERSION)
            .header(
                USER_AGENT,
                concat!("activity-tracker/", env!("CARGO_PKG_VERSION")),
            );
        if let Some(token) = &self.api_config.token {
            builder = builder.header(AUTHORIZATION, format!("token {}", token));
        }
        if let Some(etag) = &request.if_none_match {
            builder = builder.header(IF_NONE_MATCH, etag);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());
        let links = response
            .headers()
            .get(LINK)
            .and_then(|h| h.to_str().ok())
            .map(parse_link_header)
            .unwrap_or_default();

        debug!(%url, status, has_next = links.next.is_some(), "fetched events page");

        let mut page = FeedPage {
            status,
            etag,
            links,
            ..FeedPage::default()
        };

        match status {
            STATUS_OK => {
                let body = response.bytes().await?;
                let events: Vec<GitHubEvent> = serde_json::from_slice(&body)?;
                page.events = events.into_iter().map(EventRecord::from).collect();
            }
            STATUS_NOT_MODIFIED => {}
            _ => {
                let body = response.text().await.unwrap_or_default();
                page.message = Some(error_message(&body));
            }
        }

        Ok(page)
    }
}

/// Prefer the `message` field of a GitHub error document over the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Parse a `Link` header into its `next` and `last` relations
pub fn parse_link_header(link_header: &str) -> PageLinks {
    // Format: <https://api.github.com/resource?page=2>; rel="next", <...>; rel="last"
    let mut links = PageLinks::default();

    for link in link_header.split(',') {
        let mut parts = link.split(';');
        let Some(url_part) = parts.next().map(str::trim) else {
            continue;
        };
        let Some(url) = url_part
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
        else {
            continue;
        };

        for param in parts {
            let param = param.trim();
            let Some(rel) = param.strip_prefix("rel=") else {
                continue;
            };
            for relation in rel.trim_matches('"').split_whitespace() {
                match relation {
                    "next" => links.next = Some(url.to_string()),
                    "last" => links.last = Some(url.to_string()),
                    _ => {}
                }
            }
        }
    }

    links
}

/// Event as returned by `GET /repos/{owner}/{repo}/events`
#[derive(Debug, Deserialize)]
pub struct GitHubEvent {
    #[serde(deserialize_with = "deserialize_event_id")]
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "second_precision::deserialize")]
    pub created_at: DateTime<Utc>,
    pub repo: GitHubEventRepo,
}

#[derive(Debug, Deserialize)]
pub struct GitHubEventRepo {
    pub name: String,
}

impl From<GitHubEvent> for EventRecord {
    fn from(event: GitHubEvent) -> Self {
        Self {
            id: event.id,
            kind: event.kind,
            created_at: event.created_at,
            repo_name: event.repo.name,
        }
    }
}
