use super::snapshot::{SnapshotFile, StoreTables};
use super::table::LockChange;
use super::{
    ClusterInstallationFilter, ClusterInstallationStore, ClusterStore, InstallationStore,
    MigrationStore,
};
use crate::core::{Result, now_millis};
use crate::model::{Cluster, ClusterInstallation, Installation, Migration};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{Level, event};

/// Entity store held in memory, optionally persisted to a snapshot file.
///
/// Every operation runs under one table-set lock, which makes claim and
/// release atomic compare-and-set operations on the owner field.
pub struct MemoryStore {
    tables: RwLock<StoreTables>,
    snapshot: Option<SnapshotFile>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Volatile store; contents are lost when dropped.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(StoreTables::default()),
            snapshot: None,
        }
    }

    /// Durable store rooted at `data_dir`, reloading the previous snapshot.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let snapshot = SnapshotFile::in_dir(data_dir);
        let tables = snapshot.load()?.unwrap_or_default();
        event!(
            Level::INFO,
            path = %snapshot.path().display(),
            "opened durable entity store"
        );
        Ok(Self {
            tables: RwLock::new(tables),
            snapshot: Some(snapshot),
        })
    }

    pub fn is_durable(&self) -> bool {
        self.snapshot.is_some()
    }

    async fn read<T>(&self, f: impl FnOnce(&StoreTables) -> T) -> T {
        let tables = self.tables.read().await;
        f(&tables)
    }

    /// Applies a mutation. Durable stores stage it on a copy and only swap it
    /// in once the snapshot is written.
    async fn write<T>(&self, f: impl FnOnce(&mut StoreTables) -> Result<T>) -> Result<T> {
        let mut tables = self.tables.write().await;
        match &self.snapshot {
            None => f(&mut tables),
            Some(snapshot) => {
                let mut staged = tables.clone();
                let value = f(&mut staged)?;
                snapshot.save(&staged)?;
                *tables = staged;
                Ok(value)
            }
        }
    }

    /// Claim/release variant of [`Self::write`]. Refused or no-op changes
    /// skip the snapshot rewrite.
    async fn change_lock(&self, f: impl FnOnce(&mut StoreTables) -> LockChange) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match &self.snapshot {
            None => Ok(f(&mut tables).succeeded),
            Some(snapshot) => {
                let mut staged = tables.clone();
                let change = f(&mut staged);
                if change.changed {
                    snapshot.save(&staged)?;
                    *tables = staged;
                }
                Ok(change.succeeded)
            }
        }
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get_cluster(&self, id: &str) -> Result<Option<Cluster>> {
        Ok(self.read(|t| t.clusters.get(id)).await)
    }

    async fn get_clusters(&self) -> Result<Vec<Cluster>> {
        Ok(self.read(|t| t.clusters.list(|_| true)).await)
    }

    async fn get_unlocked_clusters_pending_work(&self) -> Result<Vec<Cluster>> {
        Ok(self.read(|t| t.clusters.list_unlocked_pending_work()).await)
    }

    async fn create_cluster(&self, cluster: &Cluster) -> Result<()> {
        self.write(|t| t.clusters.create(cluster)).await
    }

    async fn update_cluster(&self, cluster: &Cluster) -> Result<()> {
        self.write(|t| t.clusters.update(cluster)).await
    }

    async fn delete_cluster(&self, id: &str) -> Result<()> {
        self.write(|t| t.clusters.delete(id, now_millis())).await
    }

    async fn lock_cluster(&self, id: &str, locker_id: &str) -> Result<bool> {
        self.change_lock(|t| t.clusters.try_lock(id, locker_id, now_millis()))
            .await
    }

    async fn unlock_cluster(&self, id: &str, locker_id: &str, force: bool) -> Result<bool> {
        self.change_lock(|t| t.clusters.unlock(id, locker_id, force))
            .await
    }
}

#[async_trait]
impl InstallationStore for MemoryStore {
    async fn get_installation(&self, id: &str) -> Result<Option<Installation>> {
        Ok(self.read(|t| t.installations.get(id)).await)
    }

    async fn get_installations(&self) -> Result<Vec<Installation>> {
        Ok(self.read(|t| t.installations.list(|_| true)).await)
    }

    async fn get_unlocked_installations_pending_work(&self) -> Result<Vec<Installation>> {
        Ok(self
            .read(|t| t.installations.list_unlocked_pending_work())
            .await)
    }

    async fn create_installation(&self, installation: &Installation) -> Result<()> {
        self.write(|t| t.installations.create(installation)).await
    }

    async fn update_installation(&self, installation: &Installation) -> Result<()> {
        self.write(|t| t.installations.update(installation)).await
    }

    async fn delete_installation(&self, id: &str) -> Result<()> {
        self.write(|t| t.installations.delete(id, now_millis()))
            .await
    }

    async fn lock_installation(&self, id: &str, locker_id: &str) -> Result<bool> {
        self.change_lock(|t| t.installations.try_lock(id, locker_id, now_millis()))
            .await
    }

    async fn unlock_installation(&self, id: &str, locker_id: &str, force: bool) -> Result<bool> {
        self.change_lock(|t| t.installations.unlock(id, locker_id, force))
            .await
    }
}

#[async_trait]
impl ClusterInstallationStore for MemoryStore {
    async fn get_cluster_installation(&self, id: &str) -> Result<Option<ClusterInstallation>> {
        Ok(self.read(|t| t.cluster_installations.get(id)).await)
    }

    async fn get_cluster_installations(
        &self,
        filter: &ClusterInstallationFilter,
    ) -> Result<Vec<ClusterInstallation>> {
        Ok(self
            .read(|t| {
                if filter.include_deleted {
                    t.cluster_installations
                        .list_including_deleted(|ci| filter.matches(ci))
                } else {
                    t.cluster_installations.list(|ci| filter.matches(ci))
                }
            })
            .await)
    }

    async fn get_unlocked_cluster_installations_pending_work(
        &self,
    ) -> Result<Vec<ClusterInstallation>> {
        Ok(self
            .read(|t| t.cluster_installations.list_unlocked_pending_work())
            .await)
    }

    async fn create_cluster_installation(
        &self,
        cluster_installation: &ClusterInstallation,
    ) -> Result<()> {
        self.write(|t| t.cluster_installations.create(cluster_installation))
            .await
    }

    async fn update_cluster_installation(
        &self,
        cluster_installation: &ClusterInstallation,
    ) -> Result<()> {
        self.write(|t| t.cluster_installations.update(cluster_installation))
            .await
    }

    async fn delete_cluster_installation(&self, id: &str) -> Result<()> {
        self.write(|t| t.cluster_installations.delete(id, now_millis()))
            .await
    }

    async fn lock_cluster_installation(&self, id: &str, locker_id: &str) -> Result<bool> {
        self.change_lock(|t| t.cluster_installations.try_lock(id, locker_id, now_millis()))
            .await
    }

    async fn unlock_cluster_installation(
        &self,
        id: &str,
        locker_id: &str,
        force: bool,
    ) -> Result<bool> {
        self.change_lock(|t| t.cluster_installations.unlock(id, locker_id, force))
            .await
    }
}

#[async_trait]
impl MigrationStore for MemoryStore {
    async fn get_migration(&self, id: &str) -> Result<Option<Migration>> {
        Ok(self.read(|t| t.migrations.get(id)).await)
    }

    async fn get_migrations(&self) -> Result<Vec<Migration>> {
        Ok(self.read(|t| t.migrations.list(|_| true)).await)
    }

    async fn get_unlocked_migrations_pending_work(&self) -> Result<Vec<Migration>> {
        Ok(self.read(|t| t.migrations.list_unlocked_pending_work()).await)
    }

    async fn create_migration(&self, migration: &Migration) -> Result<()> {
        self.write(|t| t.migrations.create(migration)).await
    }

    async fn update_migration(&self, migration: &Migration) -> Result<()> {
        self.write(|t| t.migrations.update(migration)).await
    }

    async fn delete_migration(&self, id: &str) -> Result<()> {
        self.write(|t| t.migrations.delete(id, now_millis())).await
    }

    async fn lock_migration(&self, id: &str, locker_id: &str) -> Result<bool> {
        self.change_lock(|t| t.migrations.try_lock(id, locker_id, now_millis()))
            .await
    }

    async fn unlock_migration(&self, id: &str, locker_id: &str, force: bool) -> Result<bool> {
        self.change_lock(|t| t.migrations.unlock(id, locker_id, force))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DatabaseBackendKind, MigrationState};
    use tempfile::TempDir;

    #[tokio::test]
    async fn update_keeps_lock_bookkeeping() {
        let store = MemoryStore::new();
        let mut migration = Migration::new("cluster", "ci");
        store.create_migration(&migration).await.unwrap();
        assert!(store.lock_migration(&migration.id, "owner-a").await.unwrap());

        migration.state = MigrationState::CreationComplete;
        store.update_migration(&migration).await.unwrap();

        let stored = store.get_migration(&migration.id).await.unwrap().unwrap();
        assert_eq!(stored.state, MigrationState::CreationComplete);
        assert_eq!(stored.lock_acquired_by.as_deref(), Some("owner-a"));
        assert!(stored.lock_acquired_at.is_some());
    }

    #[tokio::test]
    async fn pending_work_excludes_locked_terminal_and_deleted() {
        let store = MemoryStore::new();
        let pending = Migration::new("c", "ci-1");
        let mut stable = Migration::new("c", "ci-2");
        stable.state = MigrationState::Stable;
        let locked = Migration::new("c", "ci-3");
        let deleted = Migration::new("c", "ci-4");
        for migration in [&pending, &stable, &locked, &deleted] {
            store.create_migration(migration).await.unwrap();
        }
        store.lock_migration(&locked.id, "someone").await.unwrap();
        store.delete_migration(&deleted.id).await.unwrap();

        let work = store.get_unlocked_migrations_pending_work().await.unwrap();
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].id, pending.id);
    }

    #[tokio::test]
    async fn durable_store_reloads_rows_and_claims() {
        let dir = TempDir::new().unwrap();
        let installation = Installation::new("owner", "a.example.com", DatabaseBackendKind::AwsRds);
        {
            let store = MemoryStore::open(dir.path()).unwrap();
            assert!(store.is_durable());
            store.create_installation(&installation).await.unwrap();
            assert!(store.lock_installation(&installation.id, "migration-1").await.unwrap());
        }

        let reopened = MemoryStore::open(dir.path()).unwrap();
        let stored = reopened
            .get_installation(&installation.id)
            .await
            .unwrap()
            .expect("installation persisted");
        assert_eq!(stored.lock_acquired_by.as_deref(), Some("migration-1"));
    }
}
