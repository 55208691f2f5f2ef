//! # Data Models
//!
//! Typed records persisted by the tracker and returned by the API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod event;
pub mod repository;

pub use event::{EventCollection, EventMap, EventRecord};
pub use repository::{
    MAX_REPOSITORIES, RepositoryDescriptor, RepositoryId, RepositoryMap, next_repository_id,
};

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "activity-tracker".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
