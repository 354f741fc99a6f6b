use super::{ApiError, ApiResult, AppState};
use crate::model::{ClusterInstallation, CreateInstallationRequest, Installation};
use crate::store::{ClusterInstallationFilter, ClusterInstallationStore, InstallationStore};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateInstallationRequest>,
) -> ApiResult<(StatusCode, Json<Installation>)> {
    request.validate()?;
    let mut installation = Installation::new(request.owner_id, request.dns, request.database);
    if let Some(size) = request.size {
        installation.size = size;
    }
    state.store.create_installation(&installation).await?;
    state.scheduler.trigger();
    Ok((StatusCode::ACCEPTED, Json(installation)))
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Installation>>> {
    Ok(Json(state.store.get_installations().await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Installation>> {
    state
        .store
        .get_installation(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("installation {id} not found")))
}

#[derive(Debug, Default, Deserialize)]
pub struct ClusterInstallationQuery {
    pub cluster_id: Option<String>,
    pub installation_id: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

pub async fn list_cluster_installations(
    State(state): State<AppState>,
    Query(query): Query<ClusterInstallationQuery>,
) -> ApiResult<Json<Vec<ClusterInstallation>>> {
    let filter = ClusterInstallationFilter {
        cluster_id: query.cluster_id,
        installation_id: query.installation_id,
        include_deleted: query.include_deleted,
    };
    Ok(Json(state.store.get_cluster_installations(&filter).await?))
}
