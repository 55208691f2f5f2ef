//! # Error Handling
//!
//! Domain errors raised by the registry and the ingestion pipeline, and the
//! problem+json response format they are rendered into by the HTTP layer.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::connectors::FeedError;
use crate::models::{RepositoryDescriptor, RepositoryId};
use crate::storage::StorageError;

/// Failures of tracker operations
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("No repositories configured.")]
    NoRepositoriesConfigured,

    #[error("Error fetching data for repository {repo_id}: upstream returned {status}: {message}")]
    UpstreamRejected {
        repo_id: RepositoryId,
        status: u16,
        message: String,
    },

    #[error("Error fetching data for repository {repo_id}: {source}")]
    UpstreamUnreachable {
        repo_id: RepositoryId,
        #[source]
        source: FeedError,
    },

    #[error("Maximum number of repositories ({limit}) reached.")]
    CapacityExceeded { limit: usize },

    #[error("Repository {owner}/{name} already exists.")]
    DuplicateRepository { owner: String, name: String },

    #[error("Repository {repo_id} not found.")]
    NotFound { repo_id: RepositoryId },

    #[error("Repository deleted. Error when deleting fetched events: {source}")]
    PartialDeletion {
        repo_id: RepositoryId,
        deleted: RepositoryDescriptor,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation ID for matching the response to server logs
    pub trace_id: Box<str>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: format!("corr-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
                .into_boxed_str(),
        }
    }

    /// Opaque 500 for failures whose cause stays in the server logs
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Internal Server Error",
        )
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<TrackerError> for ApiError {
    fn from(error: TrackerError) -> Self {
        let message = error.to_string();
        match error {
            TrackerError::NoRepositoriesConfigured => Self::new(
                StatusCode::BAD_REQUEST,
                "NO_REPOSITORIES_CONFIGURED",
                &message,
            ),
            TrackerError::CapacityExceeded { limit } => {
                Self::new(StatusCode::BAD_REQUEST, "REPOSITORY_LIMIT_REACHED", &message)
                    .with_details(json!({ "limit": limit }))
            }
            TrackerError::DuplicateRepository { .. } => {
                Self::new(StatusCode::CONFLICT, "REPOSITORY_EXISTS", &message)
            }
            TrackerError::NotFound { repo_id } => {
                Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", &message)
                    .with_details(json!({ "repo_id": repo_id }))
            }
            TrackerError::UpstreamRejected {
                repo_id, status, ..
            } => {
                let api_status = StatusCode::from_u16(status)
                    .ok()
                    .filter(|code| code.is_client_error() || code.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                Self::new(api_status, "UPSTREAM_REJECTED", &message)
                    .with_details(json!({ "repo_id": repo_id, "upstream_status": status }))
            }
            TrackerError::UpstreamUnreachable { repo_id, .. } => {
                tracing::warn!(repo_id, error = %message, "upstream unreachable");
                Self::new(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", &message)
                    .with_details(json!({ "repo_id": repo_id }))
            }
            TrackerError::PartialDeletion {
                repo_id, deleted, ..
            } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "PARTIAL_DELETION",
                &message,
            )
            .with_details(json!({ "repo_id": repo_id, "deleted": deleted })),
            TrackerError::Storage(err) => {
                tracing::error!(error = ?err, "storage failure");
                Self::internal()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}
