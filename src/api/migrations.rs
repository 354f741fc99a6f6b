use super::{ApiError, ApiResult, AppState, request_locker_id};
use crate::database::DatabaseMigrationError;
use crate::model::{
    ClusterInstallation, ClusterInstallationState, CreateMigrationRequest, Migration,
    MigrationState, UnlockRequest, UnlockResponse,
};
use crate::store::{
    ClusterInstallationFilter, ClusterInstallationStore, ClusterStore, EntityLock,
    InstallationStore, LockTarget, MigrationStore,
};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use std::sync::Arc;
use tracing::{Level, event};

/// Queues a migration of an installation's placement to another cluster.
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateMigrationRequest>,
) -> ApiResult<(StatusCode, Json<Migration>)> {
    request.validate()?;

    let installation = state
        .store
        .get_installation(&request.installation_id)
        .await?
        .filter(|installation| installation.delete_at.is_none())
        .ok_or_else(|| {
            ApiError::NotFound(format!("installation {} not found", request.installation_id))
        })?;

    state
        .store
        .get_cluster(&request.cluster_id)
        .await?
        .filter(|cluster| cluster.delete_at.is_none())
        .ok_or_else(|| ApiError::NotFound(format!("cluster {} not found", request.cluster_id)))?;

    let source = source_placement(&state, &request).await?;
    if source.cluster_id == request.cluster_id {
        return Err(ApiError::Input(format!(
            "installation {} is already placed on cluster {}",
            installation.id, request.cluster_id
        )));
    }

    let active = state
        .store
        .get_migrations()
        .await?
        .into_iter()
        .find(|migration| {
            migration.cluster_installation_id == source.id && !migration.state.is_terminal()
        });
    if let Some(active) = active {
        return Err(ApiError::Conflict(format!(
            "cluster installation {} is already being migrated by {}",
            source.id, active.id
        )));
    }

    if let Some(owner) = &installation.lock_acquired_by {
        return Err(ApiError::Conflict(format!(
            "installation {} is claimed by {owner}",
            installation.id
        )));
    }
    if let Some(owner) = &source.lock_acquired_by {
        return Err(ApiError::Conflict(format!(
            "cluster installation {} is claimed by {owner}",
            source.id
        )));
    }

    let migration = Migration::new(&request.cluster_id, &source.id);
    state.store.create_migration(&migration).await?;
    event!(
        Level::INFO,
        migration = %migration.id,
        cluster_installation = %source.id,
        cluster = %migration.cluster_id,
        "migration requested"
    );
    state.scheduler.trigger();

    Ok((StatusCode::ACCEPTED, Json(migration)))
}

/// The live placement named by the request, or the installation's only one.
async fn source_placement(
    state: &AppState,
    request: &CreateMigrationRequest,
) -> ApiResult<ClusterInstallation> {
    let live = |ci: &ClusterInstallation| {
        !matches!(
            ci.state,
            ClusterInstallationState::DeletionRequested
                | ClusterInstallationState::DeletionFailed
                | ClusterInstallationState::Deleted
        )
    };

    if let Some(id) = &request.cluster_installation_id {
        return state
            .store
            .get_cluster_installation(id)
            .await?
            .filter(|ci| {
                ci.delete_at.is_none() && ci.installation_id == request.installation_id && live(ci)
            })
            .ok_or_else(|| ApiError::NotFound(format!("cluster installation {id} not found")));
    }

    let mut placements = state
        .store
        .get_cluster_installations(&ClusterInstallationFilter::for_installation(
            &request.installation_id,
        ))
        .await?
        .into_iter()
        .filter(live)
        .collect::<Vec<_>>();
    match placements.len() {
        0 => Err(ApiError::NotFound(format!(
            "installation {} has no cluster installation",
            request.installation_id
        ))),
        1 => Ok(placements.remove(0)),
        count => Err(ApiError::Input(format!(
            "installation {} has {count} cluster installations; set cluster_installation_id",
            request.installation_id
        ))),
    }
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Migration>>> {
    Ok(Json(state.store.get_migrations().await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Migration>> {
    find_migration(&state, &id).await.map(Json)
}

async fn find_migration(state: &AppState, id: &str) -> ApiResult<Migration> {
    state
        .store
        .get_migration(id)
        .await?
        .filter(|migration| migration.delete_at.is_none())
        .ok_or_else(|| ApiError::NotFound(format!("migration {id} not found")))
}

/// Deletes a finished migration. Releases the claims the migration still
/// holds and, for failed migrations, removes the replica database.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let migration = find_migration(&state, &id).await?;
    if !migration.state.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "migration {id} is {} and cannot be deleted yet",
            migration.state
        )));
    }

    let lock = EntityLock::try_lock(
        Arc::clone(&state.store),
        LockTarget::Migration,
        &id,
        request_locker_id(),
    )
    .await?
    .ok_or_else(|| ApiError::Conflict(format!("migration {id} is locked")))?;

    let result = delete_locked(&state, &id).await;
    if let Err(err) = lock.unlock().await {
        event!(Level::WARN, migration = %id, error = %err, "failed to release migration lock");
    }
    result.map(|()| StatusCode::NO_CONTENT)
}

async fn delete_locked(state: &AppState, id: &str) -> ApiResult<()> {
    let migration = find_migration(state, id).await?;

    let source = state
        .store
        .get_cluster_installation(&migration.cluster_installation_id)
        .await?;
    let installation = match &source {
        Some(ci) => state.store.get_installation(&ci.installation_id).await?,
        None => None,
    };

    if migration.state == MigrationState::CreationFailed && !state.keep_database_data {
        if let Some(installation) = &installation {
            let capability = state.factory.database_migration(installation, &migration);
            match capability.teardown().await {
                Ok(()) | Err(DatabaseMigrationError::NotSupported(_)) => {}
                Err(err) => {
                    return Err(ApiError::Internal(format!(
                        "failed to remove replica database: {err}"
                    )));
                }
            }
        }
    }

    if let Some(ci) = &source {
        state
            .store
            .unlock_cluster_installation(&ci.id, &migration.id, false)
            .await?;
    }
    if let Some(installation) = &installation {
        state
            .store
            .unlock_installation(&installation.id, &migration.id, false)
            .await?;
    }

    state.store.delete_migration(id).await?;
    event!(Level::INFO, migration = %id, state = %migration.state, "migration deleted");
    Ok(())
}

/// Operator release of the migration claim.
pub async fn unlock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UnlockRequest>,
) -> ApiResult<Json<UnlockResponse>> {
    let migration = find_migration(&state, &id).await?;
    let unlocked = if request.force {
        let owner = migration.lock_acquired_by.unwrap_or_default();
        state.store.unlock_migration(&id, &owner, true).await?
    } else {
        let locker_id = request.locker_id.ok_or_else(|| {
            ApiError::Input("locker_id is required unless force is set".to_string())
        })?;
        state.store.unlock_migration(&id, &locker_id, false).await?
    };
    if unlocked {
        event!(
            Level::WARN,
            migration = %id,
            force = request.force,
            "migration lock released by operator"
        );
    }
    Ok(Json(UnlockResponse { unlocked }))
}
