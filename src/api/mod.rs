use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub mod handlers;

/// Build the staging API router.
/// Routes are relative; the caller mounts this under `/api/v1/staging`.
pub fn staging_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/claim", post(handlers::claim))
        .route("/release-expired", post(handlers::release_expired))
        .route(
            "/proposals/:kind",
            get(handlers::list_proposals).post(handlers::create_proposals),
        )
        .route("/proposals/:kind/import-mock", post(handlers::import_mock))
        .route("/proposals/:kind/batch-review", post(handlers::batch_review))
        .route("/proposals/:kind/sync", post(handlers::sync))
        .route("/proposals/:kind/sync-all", post(handlers::sync_all))
        .route(
            "/proposals/:kind/:id",
            get(handlers::get_proposal)
                .patch(handlers::review_proposal)
                .delete(handlers::delete_proposal),
        )
        .route("/stats/annotators", get(handlers::annotator_stats))
        .route("/my-tasks/stats", get(handlers::my_task_stats))
        .route("/overview", get(handlers::task_overview))
}

/// Full application router with health check
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1/staging", staging_router())
        .with_state(state)
}
