use super::{ApiError, ApiResult, AppState};
use crate::model::{Cluster, CreateClusterRequest};
use crate::store::ClusterStore;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateClusterRequest>,
) -> ApiResult<(StatusCode, Json<Cluster>)> {
    request.validate()?;
    let cluster = Cluster::new(request.provider, request.size);
    state.store.create_cluster(&cluster).await?;
    state.scheduler.trigger();
    Ok((StatusCode::ACCEPTED, Json(cluster)))
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Cluster>>> {
    Ok(Json(state.store.get_clusters().await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Cluster>> {
    state
        .store
        .get_cluster(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("cluster {id} not found")))
}
