//! Connectors module
//!
//! Upstream event feeds consumed by the ingestion engine:
//! - The `EventFeed` trait defining the fetch-page contract
//! - The GitHub REST implementation

pub mod github;
pub mod trait_;

pub use github::{GitHubApiConfig, GitHubEventsClient};
pub use trait_::{EventFeed, FeedError, FeedPage, PageLinks, PageRequest};
