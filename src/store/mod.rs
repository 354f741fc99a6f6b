//! Entity Store contract.
//!
//! Each entity type gets its own async trait with get/create/update/delete,
//! a pending-work query that only returns unlocked entities, and the atomic
//! claim/release pair. Claims succeed when the owner field is empty or already
//! held by the same claimant; releases succeed for the current owner or when
//! forced. Updates never touch the lock bookkeeping.

use crate::core::Result;
use crate::model::{Cluster, ClusterInstallation, Installation, Migration};
use async_trait::async_trait;

pub mod lock;
pub mod memory;
mod snapshot;
mod table;

pub use lock::{EntityLock, LockTarget};
pub use memory::MemoryStore;

#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_cluster(&self, id: &str) -> Result<Option<Cluster>>;
    async fn get_clusters(&self) -> Result<Vec<Cluster>>;
    async fn get_unlocked_clusters_pending_work(&self) -> Result<Vec<Cluster>>;
    async fn create_cluster(&self, cluster: &Cluster) -> Result<()>;
    async fn update_cluster(&self, cluster: &Cluster) -> Result<()>;
    async fn delete_cluster(&self, id: &str) -> Result<()>;
    async fn lock_cluster(&self, id: &str, locker_id: &str) -> Result<bool>;
    async fn unlock_cluster(&self, id: &str, locker_id: &str, force: bool) -> Result<bool>;
}

#[async_trait]
pub trait InstallationStore: Send + Sync {
    async fn get_installation(&self, id: &str) -> Result<Option<Installation>>;
    async fn get_installations(&self) -> Result<Vec<Installation>>;
    async fn get_unlocked_installations_pending_work(&self) -> Result<Vec<Installation>>;
    async fn create_installation(&self, installation: &Installation) -> Result<()>;
    async fn update_installation(&self, installation: &Installation) -> Result<()>;
    async fn delete_installation(&self, id: &str) -> Result<()>;
    async fn lock_installation(&self, id: &str, locker_id: &str) -> Result<bool>;
    async fn unlock_installation(&self, id: &str, locker_id: &str, force: bool) -> Result<bool>;
}

/// Filter for cluster installation listings; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterInstallationFilter {
    pub cluster_id: Option<String>,
    pub installation_id: Option<String>,
    pub include_deleted: bool,
}

impl ClusterInstallationFilter {
    pub fn for_installation(installation_id: impl Into<String>) -> Self {
        Self {
            installation_id: Some(installation_id.into()),
            ..Self::default()
        }
    }

    pub fn for_cluster(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: Some(cluster_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, cluster_installation: &ClusterInstallation) -> bool {
        if !self.include_deleted && cluster_installation.delete_at.is_some() {
            return false;
        }
        if let Some(cluster_id) = &self.cluster_id {
            if &cluster_installation.cluster_id != cluster_id {
                return false;
            }
        }
        if let Some(installation_id) = &self.installation_id {
            if &cluster_installation.installation_id != installation_id {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait ClusterInstallationStore: Send + Sync {
    async fn get_cluster_installation(&self, id: &str) -> Result<Option<ClusterInstallation>>;
    async fn get_cluster_installations(
        &self,
        filter: &ClusterInstallationFilter,
    ) -> Result<Vec<ClusterInstallation>>;
    async fn get_unlocked_cluster_installations_pending_work(
        &self,
    ) -> Result<Vec<ClusterInstallation>>;
    async fn create_cluster_installation(
        &self,
        cluster_installation: &ClusterInstallation,
    ) -> Result<()>;
    async fn update_cluster_installation(
        &self,
        cluster_installation: &ClusterInstallation,
    ) -> Result<()>;
    async fn delete_cluster_installation(&self, id: &str) -> Result<()>;
    async fn lock_cluster_installation(&self, id: &str, locker_id: &str) -> Result<bool>;
    async fn unlock_cluster_installation(
        &self,
        id: &str,
        locker_id: &str,
        force: bool,
    ) -> Result<bool>;
}

#[async_trait]
pub trait MigrationStore: Send + Sync {
    async fn get_migration(&self, id: &str) -> Result<Option<Migration>>;
    async fn get_migrations(&self) -> Result<Vec<Migration>>;
    async fn get_unlocked_migrations_pending_work(&self) -> Result<Vec<Migration>>;
    async fn create_migration(&self, migration: &Migration) -> Result<()>;
    async fn update_migration(&self, migration: &Migration) -> Result<()>;
    async fn delete_migration(&self, id: &str) -> Result<()>;
    async fn lock_migration(&self, id: &str, locker_id: &str) -> Result<bool>;
    async fn unlock_migration(&self, id: &str, locker_id: &str, force: bool) -> Result<bool>;
}

/// Everything the supervisors and the API need from persistence.
#[async_trait]
pub trait Store: ClusterStore + InstallationStore + ClusterInstallationStore + MigrationStore {
    /// Claims the target entity for `locker_id`.
    async fn lock_entity(&self, target: LockTarget, id: &str, locker_id: &str) -> Result<bool> {
        match target {
            LockTarget::Cluster => self.lock_cluster(id, locker_id).await,
            LockTarget::Installation => self.lock_installation(id, locker_id).await,
            LockTarget::ClusterInstallation => {
                self.lock_cluster_installation(id, locker_id).await
            }
            LockTarget::Migration => self.lock_migration(id, locker_id).await,
        }
    }

    /// Releases the claim on the target entity.
    async fn unlock_entity(
        &self,
        target: LockTarget,
        id: &str,
        locker_id: &str,
        force: bool,
    ) -> Result<bool> {
        match target {
            LockTarget::Cluster => self.unlock_cluster(id, locker_id, force).await,
            LockTarget::Installation => self.unlock_installation(id, locker_id, force).await,
            LockTarget::ClusterInstallation => {
                self.unlock_cluster_installation(id, locker_id, force).await
            }
            LockTarget::Migration => self.unlock_migration(id, locker_id, force).await,
        }
    }
}

impl<T> Store for T where T: ClusterStore + InstallationStore + ClusterInstallationStore + MigrationStore
{}
