//! # Repository Registry Handlers
//!
//! Listing, adding and removing tracked repositories.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::error::{ApiError, validation_error};
use crate::models::{RepositoryDescriptor, RepositoryId, RepositoryMap};
use crate::server::AppState;

/// Request body for registering a repository
#[derive(Debug, Deserialize, ToSchema)]
pub struct AddRepositoryRequest {
    /// Repository owner (user or organisation)
    #[schema(example = "rust-lang")]
    pub owner: String,
    /// Repository name
    #[schema(example = "cargo")]
    pub name: String,
}

/// Response after registering a repository
#[derive(Debug, Serialize, ToSchema)]
pub struct AddRepositoryResponse {
    pub message: String,
    /// Id allocated to the new repository
    pub repo_id: RepositoryId,
    /// Full registry after the addition
    #[schema(value_type = Object)]
    pub data: RepositoryMap,
}

/// Response after removing a repository
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteRepositoryResponse {
    pub message: String,
    pub deleted: RepositoryDescriptor,
}

/// List the registered repositories keyed by id
#[utoipa::path(
    get,
    path = "/list-repositories",
    responses(
        (status = 200, description = "Registered repositories keyed by id", body = serde_json::Value, example = json!({
            "0": {"owner": "rust-lang", "name": "cargo", "etag": "W/\"5f0c\""}
        })),
        (status = 404, description = "No repositories registered", body = ApiError),
        (status = 500, description = "Storage error", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn list_repositories(
    State(state): State<AppState>,
) -> Result<Json<RepositoryMap>, ApiError> {
    let repositories = state.tracker.list_repositories().await?;
    if repositories.is_empty() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "No repositories found.",
        ));
    }
    Ok(Json(repositories))
}

/// Register a repository for tracking
#[utoipa::path(
    post,
    path = "/add-repository",
    request_body = AddRepositoryRequest,
    responses(
        (status = 201, description = "Repository registered", body = AddRepositoryResponse),
        (status = 400, description = "Invalid body or registry full", body = ApiError),
        (status = 409, description = "Repository already registered", body = ApiError),
        (status = 500, description = "Storage error", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn add_repository(
    State(state): State<AppState>,
    payload: Result<Json<AddRepositoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AddRepositoryResponse>), ApiError> {
    let Json(request) = payload?;
    let owner = request.owner.trim();
    let name = request.name.trim();

    let mut blank = Vec::new();
    if owner.is_empty() {
        blank.push("owner");
    }
    if name.is_empty() {
        blank.push("name");
    }
    if !blank.is_empty() {
        return Err(validation_error(
            "Invalid request. 'owner' and 'name' are required.",
            json!({ "blank_fields": blank }),
        ));
    }

    let (repo_id, data) = state.tracker.add_repository(owner, name).await?;

    Ok((
        StatusCode::CREATED,
        Json(AddRepositoryResponse {
            message: "Successfully added repository.".to_string(),
            repo_id,
            data,
        }),
    ))
}

/// Remove a repository and its stored events
#[utoipa::path(
    delete,
    path = "/configure-repositories/{repo_id}",
    params(
        ("repo_id" = u32, Path, description = "Registry id of the repository")
    ),
    responses(
        (status = 200, description = "Repository removed", body = DeleteRepositoryResponse),
        (status = 404, description = "Unknown repository id", body = ApiError),
        (status = 500, description = "Repository removed but its events could not be", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn delete_repository(
    State(state): State<AppState>,
    Path(repo_id): Path<RepositoryId>,
) -> Result<Json<DeleteRepositoryResponse>, ApiError> {
    let deleted = state.tracker.delete_repository(repo_id).await?;
    Ok(Json(DeleteRepositoryResponse {
        message: "Repository deleted.".to_string(),
        deleted,
    }))
}
