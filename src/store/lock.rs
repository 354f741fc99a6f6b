//! Owner-tagged claims on store entities.

use super::Store;
use crate::core::Result;
use std::fmt;
use std::sync::Arc;
use tracing::{Level, event};

/// Entity type a claim applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockTarget {
    Cluster,
    Installation,
    ClusterInstallation,
    Migration,
}

impl LockTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockTarget::Cluster => "cluster",
            LockTarget::Installation => "installation",
            LockTarget::ClusterInstallation => "cluster_installation",
            LockTarget::Migration => "migration",
        }
    }
}

impl fmt::Display for LockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A held claim on one entity.
///
/// Release it with [`EntityLock::unlock`]. A guard dropped while still held
/// (panic, cancelled future) spawns the release on the current runtime.
pub struct EntityLock {
    store: Arc<dyn Store>,
    target: LockTarget,
    id: String,
    locker_id: String,
    held: bool,
}

impl EntityLock {
    /// Claims `id` for `locker_id`. `Ok(None)` means someone else holds it.
    ///
    /// # Examples
    ///
    /// ```
    /// use provisioner::model::Migration;
    /// use provisioner::store::{EntityLock, LockTarget, MemoryStore, MigrationStore, Store};
    /// use std::sync::Arc;
    ///
    /// # tokio_test::block_on(async {
    /// let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    /// let migration = Migration::new("cluster-2", "ci-1");
    /// store.create_migration(&migration).await.unwrap();
    ///
    /// let lock = EntityLock::try_lock(Arc::clone(&store), LockTarget::Migration, &migration.id, "a")
    ///     .await
    ///     .unwrap()
    ///     .unwrap();
    /// let other = EntityLock::try_lock(Arc::clone(&store), LockTarget::Migration, &migration.id, "b")
    ///     .await
    ///     .unwrap();
    /// assert!(other.is_none());
    /// assert!(lock.unlock().await.unwrap());
    /// # });
    /// ```
    pub async fn try_lock(
        store: Arc<dyn Store>,
        target: LockTarget,
        id: impl Into<String>,
        locker_id: impl Into<String>,
    ) -> Result<Option<Self>> {
        let id = id.into();
        let locker_id = locker_id.into();
        if !store.lock_entity(target, &id, &locker_id).await? {
            event!(
                Level::DEBUG,
                target = %target,
                id = %id,
                locker = %locker_id,
                "entity is claimed by another actor"
            );
            return Ok(None);
        }
        Ok(Some(Self {
            store,
            target,
            id,
            locker_id,
            held: true,
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn locker_id(&self) -> &str {
        &self.locker_id
    }

    /// Releases the claim; returns whether a release occurred.
    pub async fn unlock(mut self) -> Result<bool> {
        self.held = false;
        let released = self
            .store
            .unlock_entity(self.target, &self.id, &self.locker_id, false)
            .await?;
        if !released {
            event!(
                Level::WARN,
                target = %self.target,
                id = %self.id,
                locker = %self.locker_id,
                "claim was already gone when releasing"
            );
        }
        Ok(released)
    }
}

impl Drop for EntityLock {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            event!(
                Level::ERROR,
                target = %self.target,
                id = %self.id,
                "claim dropped outside a runtime, it must be force-released"
            );
            return;
        };
        let store = Arc::clone(&self.store);
        let target = self.target;
        let id = std::mem::take(&mut self.id);
        let locker_id = std::mem::take(&mut self.locker_id);
        handle.spawn(async move {
            if let Err(err) = store.unlock_entity(target, &id, &locker_id, false).await {
                event!(
                    Level::WARN,
                    target = %target,
                    id = %id,
                    error = %err,
                    "failed to release dropped claim"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Migration;
    use crate::store::{MemoryStore, MigrationStore};

    #[tokio::test]
    async fn second_owner_is_refused_until_release() {
        let store = Arc::new(MemoryStore::new());
        let migration = Migration::new("c", "ci");
        store.create_migration(&migration).await.unwrap();
        let dyn_store: Arc<dyn Store> = store.clone();

        let lock = EntityLock::try_lock(dyn_store.clone(), LockTarget::Migration, &migration.id, "a")
            .await
            .unwrap()
            .expect("first claim");
        assert!(
            EntityLock::try_lock(dyn_store.clone(), LockTarget::Migration, &migration.id, "b")
                .await
                .unwrap()
                .is_none()
        );

        assert!(lock.unlock().await.unwrap());
        assert!(
            EntityLock::try_lock(dyn_store, LockTarget::Migration, &migration.id, "b")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn dropped_guard_releases_in_background() {
        let store = Arc::new(MemoryStore::new());
        let migration = Migration::new("c", "ci");
        store.create_migration(&migration).await.unwrap();
        let dyn_store: Arc<dyn Store> = store.clone();

        {
            let _lock = EntityLock::try_lock(dyn_store, LockTarget::Migration, &migration.id, "a")
                .await
                .unwrap()
                .expect("claim");
        }

        for _ in 0..50 {
            tokio::task::yield_now().await;
            let stored = store.get_migration(&migration.id).await.unwrap().unwrap();
            if stored.lock_acquired_by.is_none() {
                return;
            }
        }
        panic!("dropped claim was never released");
    }
}
