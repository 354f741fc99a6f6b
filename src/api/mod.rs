//! HTTP API.
//!
//! Thin JSON surface over the store: operators create clusters and
//! installations and request migrations. Every write that creates work nudges
//! the scheduler so supervisors pick it up without waiting a full interval.

use crate::core::new_id;
use crate::database::DatabaseMigrationFactory;
use crate::store::Store;
use crate::supervisor::SchedulerHandle;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod clusters;
pub mod error;
pub mod installations;
pub mod migrations;

pub use error::{ApiError, ApiResult, ErrorResponse};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub factory: Arc<dyn DatabaseMigrationFactory>,
    pub scheduler: SchedulerHandle,
    /// Skip the replica teardown when deleting a failed migration.
    pub keep_database_data: bool,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        factory: Arc<dyn DatabaseMigrationFactory>,
        scheduler: SchedulerHandle,
    ) -> Self {
        Self {
            store,
            factory,
            scheduler,
            keep_database_data: false,
        }
    }

    pub fn keep_database_data(mut self, keep: bool) -> Self {
        self.keep_database_data = keep;
        self
    }
}

/// Owner id for claims taken while serving one request.
pub(crate) fn request_locker_id() -> String {
    format!("api-{}", new_id())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/clusters", post(clusters::create).get(clusters::list))
        .route("/api/clusters/:id", get(clusters::get))
        .route(
            "/api/installations",
            post(installations::create).get(installations::list),
        )
        .route("/api/installations/:id", get(installations::get))
        .route(
            "/api/cluster_installations",
            get(installations::list_cluster_installations),
        )
        .route(
            "/api/migrations",
            post(migrations::create).get(migrations::list),
        )
        .route(
            "/api/migrations/:id",
            get(migrations::get).delete(migrations::delete),
        )
        .route("/api/migrations/:id/unlock", post(migrations::unlock))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
