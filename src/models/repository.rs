//! Tracked repository descriptor
//!
//! A registered upstream repository together with the validator token from its
//! last successful events fetch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Registry identifier. Serialized as the string key of the persisted mapping.
pub type RepositoryId = u32;

/// Persisted registry: repository id to descriptor.
pub type RepositoryMap = BTreeMap<RepositoryId, RepositoryDescriptor>;

/// Maximum number of repositories tracked at once.
pub const MAX_REPOSITORIES: usize = 5;

/// Repository tracked by the ingestion pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RepositoryDescriptor {
    /// Owner (user or organisation) of the repository
    pub owner: String,
    /// Repository name
    pub name: String,
    /// Opaque cache validator returned by the last successful first-page fetch
    #[serde(rename = "etag", default)]
    pub cache_token: Option<String>,
}

impl RepositoryDescriptor {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            cache_token: None,
        }
    }

    /// `owner/name`, the key used in statistics output
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn is_same_repository(&self, owner: &str, name: &str) -> bool {
        self.owner == owner && self.name == name
    }
}

/// Next id to allocate: one past the largest id in use, or 0 for an empty registry.
pub fn next_repository_id(repositories: &RepositoryMap) -> RepositoryId {
    repositories
        .keys()
        .next_back()
        .map(|max| max + 1)
        .unwrap_or(0)
}
