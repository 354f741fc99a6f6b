//! Migration supervisor.
//!
//! Moves one cluster installation to a destination cluster, database
//! included. Each tick advances a migration by at most one state:
//!
//! | state                        | action                                   | next on success              |
//! |------------------------------|------------------------------------------|------------------------------|
//! | `CreationRequested`          | check backend, claim placement + tenant  | `CreationComplete`           |
//! | `CreationComplete`           | request snapshot                         | `SnapshotCreationInProgress` |
//! | `SnapshotCreationInProgress` | poll snapshot                            | `SnapshotCreationComplete`   |
//! | `SnapshotCreationComplete`   | request replica restore                  | `RestoreDatabaseInProgress`  |
//! | `RestoreDatabaseInProgress`  | poll replica                             | `RestoreDatabaseComplete`    |
//! | `RestoreDatabaseComplete`    | ensure destination placement             | `Stable`                     |
//!
//! Waiting and infrastructure errors keep the current state; terminal
//! failures move to `CreationFailed`. Claims on the source placement and
//! installation are held by the migration id until an operator deletes the
//! migration.

use super::cluster_installation::ClusterInstallationSupervisor;
use super::{Supervisor, release};
use crate::core::Result;
use crate::database::{
    DatabaseMigration, DatabaseMigrationError, DatabaseMigrationFactory, DatabaseMigrationStatus,
    FailureClass,
};
use crate::model::{ClusterInstallation, Installation, Migration, MigrationState};
use crate::store::{ClusterInstallationStore, ClusterStore, EntityLock, LockTarget, Store};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

pub const DEFAULT_WORKER_LIMIT: usize = 4;

/// What one [`MigrationSupervisor::supervise`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperviseOutcome {
    /// Another actor holds the migration this tick.
    LockNotAcquired,
    /// The migration is gone, deleted, or could not be read.
    Skipped,
    Unchanged(MigrationState),
    Transitioned {
        from: MigrationState,
        to: MigrationState,
    },
    /// The transition was computed but the write failed; the next tick
    /// recomputes it.
    PersistFailed {
        from: MigrationState,
        to: MigrationState,
    },
}

pub struct MigrationSupervisor {
    store: Arc<dyn Store>,
    factory: Arc<dyn DatabaseMigrationFactory>,
    instance_id: String,
    worker_limit: usize,
}

impl MigrationSupervisor {
    pub fn new(
        store: Arc<dyn Store>,
        factory: Arc<dyn DatabaseMigrationFactory>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            factory,
            instance_id: instance_id.into(),
            worker_limit: DEFAULT_WORKER_LIMIT,
        }
    }

    /// Number of migrations supervised concurrently within one tick.
    pub fn with_worker_limit(mut self, worker_limit: usize) -> Self {
        self.worker_limit = worker_limit.max(1);
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Claims the migration, advances it by at most one state and releases
    /// the claim again on every path.
    pub async fn supervise(&self, migration: &Migration) -> SuperviseOutcome {
        let span = info_span!(
            "supervise_migration",
            migration = %migration.id,
            instance = %self.instance_id
        );
        async {
            let lock = match EntityLock::try_lock(
                Arc::clone(&self.store),
                LockTarget::Migration,
                &migration.id,
                &self.instance_id,
            )
            .await
            {
                Ok(Some(lock)) => lock,
                Ok(None) => {
                    event!(Level::DEBUG, "migration is claimed by another supervisor");
                    return SuperviseOutcome::LockNotAcquired;
                }
                Err(err) => {
                    event!(Level::WARN, error = %err, "failed to claim migration");
                    return SuperviseOutcome::LockNotAcquired;
                }
            };
            let outcome = self.supervise_locked(&migration.id).await;
            release(lock).await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn supervise_locked(&self, id: &str) -> SuperviseOutcome {
        let mut migration = match self.store.get_migration(id).await {
            Ok(Some(migration)) if migration.delete_at.is_none() => migration,
            Ok(_) => return SuperviseOutcome::Skipped,
            Err(err) => {
                event!(Level::WARN, error = %err, "failed to reload migration");
                return SuperviseOutcome::Skipped;
            }
        };

        let from = migration.state;
        let to = self.transition(&migration).await;
        if to == from {
            return SuperviseOutcome::Unchanged(from);
        }
        if !from.can_transition_to(to) {
            event!(
                Level::ERROR,
                from = %from,
                to = %to,
                "refusing out-of-order migration transition"
            );
            return SuperviseOutcome::Unchanged(from);
        }

        migration.state = to;
        if let Err(err) = self.store.update_migration(&migration).await {
            event!(Level::WARN, error = %err, to = %to, "failed to persist migration state");
            return SuperviseOutcome::PersistFailed { from, to };
        }
        event!(Level::INFO, from = %from, to = %to, "migration transitioned");
        SuperviseOutcome::Transitioned { from, to }
    }

    /// Computes the next state of `migration`, issuing at most the one
    /// request that belongs to its current state. Returns the current state
    /// when the step has to be retried.
    pub async fn transition(&self, migration: &Migration) -> MigrationState {
        match migration.state {
            MigrationState::CreationRequested => self.claim_source(migration).await,
            MigrationState::CreationComplete => self.request_snapshot(migration).await,
            MigrationState::SnapshotCreationInProgress => self.check_snapshot(migration).await,
            MigrationState::SnapshotCreationComplete => self.request_restore(migration).await,
            MigrationState::RestoreDatabaseInProgress => self.check_restore(migration).await,
            MigrationState::RestoreDatabaseComplete => self.place_on_destination(migration).await,
            MigrationState::Stable | MigrationState::CreationFailed => migration.state,
        }
    }

    async fn claim_source(&self, migration: &Migration) -> MigrationState {
        match self.destination_exists(migration).await {
            Ok(true) => {}
            Ok(false) => {
                event!(
                    Level::ERROR,
                    cluster = %migration.cluster_id,
                    "destination cluster does not exist"
                );
                return MigrationState::CreationFailed;
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "failed to load destination cluster");
                return migration.state;
            }
        }
        match self.acquire_source(migration).await {
            Ok(_) => MigrationState::CreationComplete,
            Err(state) => state,
        }
    }

    async fn request_snapshot(&self, migration: &Migration) -> MigrationState {
        let capability = match self.capability(migration).await {
            Ok(capability) => capability,
            Err(state) => return state,
        };
        match capability.snapshot().await {
            Ok(()) => MigrationState::SnapshotCreationInProgress,
            Err(err) => self.on_capability_error(migration, "snapshot", err),
        }
    }

    async fn check_snapshot(&self, migration: &Migration) -> MigrationState {
        let capability = match self.capability(migration).await {
            Ok(capability) => capability,
            Err(state) => return state,
        };
        match capability.snapshot_status().await {
            Ok(status) => self.on_status(
                migration,
                "snapshot",
                status,
                MigrationState::SnapshotCreationComplete,
            ),
            Err(err) => self.on_capability_error(migration, "snapshot status", err),
        }
    }

    async fn request_restore(&self, migration: &Migration) -> MigrationState {
        let capability = match self.capability(migration).await {
            Ok(capability) => capability,
            Err(state) => return state,
        };
        match capability.restore().await {
            Ok(()) => MigrationState::RestoreDatabaseInProgress,
            Err(err) => self.on_capability_error(migration, "restore", err),
        }
    }

    async fn check_restore(&self, migration: &Migration) -> MigrationState {
        let capability = match self.capability(migration).await {
            Ok(capability) => capability,
            Err(state) => return state,
        };
        match capability.database_status().await {
            Ok(status) => self.on_status(
                migration,
                "database",
                status,
                MigrationState::RestoreDatabaseComplete,
            ),
            Err(err) => self.on_capability_error(migration, "database status", err),
        }
    }

    /// Ensures the installation has a placement on the destination cluster.
    /// The new placement is left unclaimed for the cluster installation
    /// supervisor to reconcile.
    async fn place_on_destination(&self, migration: &Migration) -> MigrationState {
        let (_, installation) = match self.acquire_source(migration).await {
            Ok(source) => source,
            Err(state) => return state,
        };
        match ClusterInstallationSupervisor::ensure_cluster_installation(
            self.store.as_ref(),
            &installation.id,
            &migration.cluster_id,
        )
        .await
        {
            Ok(destination) => {
                event!(
                    Level::INFO,
                    cluster_installation = %destination.id,
                    cluster = %migration.cluster_id,
                    "destination placement requested"
                );
                MigrationState::Stable
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "failed to create destination placement");
                migration.state
            }
        }
    }

    async fn destination_exists(&self, migration: &Migration) -> Result<bool> {
        Ok(self
            .store
            .get_cluster(&migration.cluster_id)
            .await?
            .is_some_and(|cluster| cluster.delete_at.is_none()))
    }

    /// Loads the source placement and installation, verifies the database
    /// backend can be migrated, and claims both for the migration id
    /// (placement first). Claims already held by this migration are kept.
    ///
    /// `Err` carries the state to return: unchanged to retry next tick, or
    /// `CreationFailed`.
    async fn acquire_source(
        &self,
        migration: &Migration,
    ) -> std::result::Result<(ClusterInstallation, Installation), MigrationState> {
        let (cluster_installation, installation) = self.load_source(migration).await?;

        if !installation.database.is_migratable() {
            event!(
                Level::ERROR,
                installation = %installation.id,
                database = %installation.database,
                "database backend does not support migration"
            );
            return Err(MigrationState::CreationFailed);
        }

        match self
            .store
            .lock_cluster_installation(&cluster_installation.id, &migration.id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                event!(
                    Level::INFO,
                    cluster_installation = %cluster_installation.id,
                    "source placement is claimed by another actor"
                );
                return Err(migration.state);
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "failed to claim source placement");
                return Err(migration.state);
            }
        }

        match self
            .store
            .lock_installation(&installation.id, &migration.id)
            .await
        {
            Ok(true) => Ok((cluster_installation, installation)),
            Ok(false) => {
                event!(
                    Level::INFO,
                    installation = %installation.id,
                    "installation is claimed by another actor"
                );
                self.release_partial_claim(migration, &cluster_installation)
                    .await;
                Err(migration.state)
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "failed to claim installation");
                self.release_partial_claim(migration, &cluster_installation)
                    .await;
                Err(migration.state)
            }
        }
    }

    /// Drops the placement claim when the installation could not be claimed,
    /// so the installation's other supervisors are never left waiting on half
    /// a migration.
    async fn release_partial_claim(
        &self,
        migration: &Migration,
        cluster_installation: &ClusterInstallation,
    ) {
        if let Err(err) = self
            .store
            .unlock_cluster_installation(&cluster_installation.id, &migration.id, false)
            .await
        {
            event!(Level::WARN, error = %err, "failed to release source placement claim");
        }
    }

    async fn load_source(
        &self,
        migration: &Migration,
    ) -> std::result::Result<(ClusterInstallation, Installation), MigrationState> {
        let cluster_installation = match self
            .store
            .get_cluster_installation(&migration.cluster_installation_id)
            .await
        {
            Ok(Some(ci)) if ci.delete_at.is_none() => ci,
            Ok(_) => {
                event!(
                    Level::ERROR,
                    cluster_installation = %migration.cluster_installation_id,
                    "source placement does not exist"
                );
                return Err(MigrationState::CreationFailed);
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "failed to load source placement");
                return Err(migration.state);
            }
        };

        let installation = match self
            .store
            .get_installation(&cluster_installation.installation_id)
            .await
        {
            Ok(Some(installation)) if installation.delete_at.is_none() => installation,
            Ok(_) => {
                event!(
                    Level::ERROR,
                    installation = %cluster_installation.installation_id,
                    "installation does not exist"
                );
                return Err(MigrationState::CreationFailed);
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "failed to load installation");
                return Err(migration.state);
            }
        };
        Ok((cluster_installation, installation))
    }

    async fn capability(
        &self,
        migration: &Migration,
    ) -> std::result::Result<Arc<dyn DatabaseMigration>, MigrationState> {
        let (_, installation) = self.acquire_source(migration).await?;
        Ok(self.factory.database_migration(&installation, migration))
    }

    fn on_status(
        &self,
        migration: &Migration,
        step: &'static str,
        status: DatabaseMigrationStatus,
        ready: MigrationState,
    ) -> MigrationState {
        match status {
            DatabaseMigrationStatus::Ready => ready,
            DatabaseMigrationStatus::InProgress => {
                event!(Level::DEBUG, step, "waiting for cloud resource");
                migration.state
            }
            DatabaseMigrationStatus::Failing => {
                event!(Level::ERROR, step, "cloud resource is failing");
                MigrationState::CreationFailed
            }
        }
    }

    fn on_capability_error(
        &self,
        migration: &Migration,
        step: &'static str,
        err: DatabaseMigrationError,
    ) -> MigrationState {
        match err.class() {
            FailureClass::Transient => {
                event!(Level::INFO, step, reason = %err, "database migration step pending");
                migration.state
            }
            FailureClass::Retryable => {
                event!(Level::WARN, step, error = %err, "database migration step will be retried");
                migration.state
            }
            FailureClass::Terminal => {
                event!(Level::ERROR, step, error = %err, "database migration step failed");
                MigrationState::CreationFailed
            }
        }
    }
}

#[async_trait]
impl Supervisor for MigrationSupervisor {
    fn name(&self) -> &'static str {
        "migration"
    }

    /// Supervises every unlocked migration pending work through a bounded
    /// pool. A listing failure ends the tick quietly.
    async fn do_work(&self) -> Result<()> {
        let pending = match self.store.get_unlocked_migrations_pending_work().await {
            Ok(pending) => pending,
            Err(err) => {
                event!(Level::WARN, error = %err, "failed to list migrations pending work");
                return Ok(());
            }
        };
        if pending.is_empty() {
            return Ok(());
        }
        event!(Level::DEBUG, count = pending.len(), "supervising migrations");

        futures::stream::iter(pending)
            .for_each_concurrent(self.worker_limit, |migration| async move {
                self.supervise(&migration).await;
            })
            .await;
        Ok(())
    }
}
