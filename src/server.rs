//! # Server Configuration
//!
//! Router setup, shared state and the serve loop of the tracker API.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{delete, get, post},
};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::connectors::GitHubEventsClient;
use crate::handlers;
use crate::scheduler::IngestScheduler;
use crate::storage::JsonFileStore;
use crate::tracker::Tracker;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Tracker>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route(
            "/list-repositories",
            get(handlers::repositories::list_repositories),
        )
        .route(
            "/add-repository",
            post(handlers::repositories::add_repository),
        )
        .route(
            "/configure-repositories/{repo_id}",
            delete(handlers::repositories::delete_repository),
        )
        .route("/fetch-events", post(handlers::events::fetch_events))
        .route("/statistics", get(handlers::events::get_statistics))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}

/// Build the tracker described by `config`: JSON file storage and the GitHub events API.
pub fn build_tracker(config: &AppConfig) -> anyhow::Result<Tracker> {
    let store = JsonFileStore::new(config.repositories_path.clone(), config.events_path.clone());
    info!(
        repositories = %store.repositories_path().display(),
        events = %store.events_path().display(),
        "using JSON state files"
    );
    let feed = GitHubEventsClient::new(config.github_api()).context("building GitHub client")?;
    Ok(Tracker::new(
        Arc::new(store),
        Arc::new(feed),
        config.retention_policy(),
    ))
}

/// Starts the server with the given configuration and serves until Ctrl-C
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let tracker = Arc::new(build_tracker(&config)?);
    let shutdown = CancellationToken::new();

    let scheduler = (config.ingest_interval_seconds > 0).then(|| {
        let scheduler = IngestScheduler::new(
            tracker.clone(),
            Duration::from_secs(config.ingest_interval_seconds),
        );
        tokio::spawn(scheduler.run(shutdown.clone()))
    });

    let app = create_app(AppState { tracker });

    // Resolve the configured bind address
    let addr = config.bind_addr().context("invalid server address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
        .context("axum server error")?;

    shutdown.cancel();
    if let Some(handle) = scheduler {
        handle.await.context("ingest scheduler task failed")?;
    }

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::repositories::list_repositories,
        crate::handlers::repositories::add_repository,
        crate::handlers::repositories::delete_repository,
        crate::handlers::events::fetch_events,
        crate::handlers::events::get_statistics,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::RepositoryDescriptor,
            crate::models::EventRecord,
            crate::handlers::repositories::AddRepositoryRequest,
            crate::handlers::repositories::AddRepositoryResponse,
            crate::handlers::repositories::DeleteRepositoryResponse,
            crate::ingest::IngestReport,
            crate::ingest::RepositoryIngest,
            crate::ingest::IngestOutcome,
            crate::error::ApiError,
        )
    ),
    tags(
        (name = "root", description = "Service information"),
        (name = "repositories", description = "Tracked repository registry"),
        (name = "events", description = "Event ingestion and statistics")
    ),
    info(
        title = "Activity Tracker API",
        description = "Tracks public GitHub repository events and reports timing statistics",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
