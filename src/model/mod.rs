//! Control-plane entities and their state machines.
//!
//! Every entity carries the same lock bookkeeping (`lock_acquired_by`,
//! `lock_acquired_at`) and soft-delete marker (`delete_at`); the [`Entity`]
//! trait exposes them uniformly so the store can implement claim/release once.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Common surface of every persisted control-plane entity.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Human-readable entity kind, used in errors and logs.
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn lock_acquired_by(&self) -> Option<&str>;
    fn lock_acquired_at(&self) -> Option<i64>;
    fn set_lock(&mut self, owner: Option<String>, acquired_at: Option<i64>);
    fn create_at(&self) -> i64;
    fn delete_at(&self) -> Option<i64>;
    fn set_delete_at(&mut self, at: i64);

    /// Whether the entity's state asks a supervisor for work on the next tick.
    fn is_pending_work(&self) -> bool;

    fn is_locked(&self) -> bool {
        self.lock_acquired_by().is_some()
    }

    fn is_deleted(&self) -> bool {
        self.delete_at().is_some()
    }
}

/// Implements [`Entity`] for a struct with the standard bookkeeping fields
/// and a `state` whose type exposes `is_pending_work()`.
macro_rules! impl_entity {
    ($ty:ty, $kind:literal) => {
        impl $crate::model::Entity for $ty {
            const KIND: &'static str = $kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn lock_acquired_by(&self) -> Option<&str> {
                self.lock_acquired_by.as_deref()
            }

            fn lock_acquired_at(&self) -> Option<i64> {
                self.lock_acquired_at
            }

            fn set_lock(&mut self, owner: Option<String>, acquired_at: Option<i64>) {
                self.lock_acquired_by = owner;
                self.lock_acquired_at = acquired_at;
            }

            fn create_at(&self) -> i64 {
                self.create_at
            }

            fn delete_at(&self) -> Option<i64> {
                self.delete_at
            }

            fn set_delete_at(&mut self, at: i64) {
                self.delete_at = Some(at);
            }

            fn is_pending_work(&self) -> bool {
                self.state.is_pending_work()
            }
        }
    };
}

pub(crate) use impl_entity;

pub mod cluster;
pub mod cluster_installation;
pub mod database;
pub mod installation;
pub mod migration;
pub mod requests;

pub use cluster::{Cluster, ClusterState};
pub use cluster_installation::{ClusterInstallation, ClusterInstallationState};
pub use database::DatabaseBackendKind;
pub use installation::{Installation, InstallationState};
pub use migration::{Migration, MigrationState};
pub use requests::{
    CreateClusterRequest, CreateInstallationRequest, CreateMigrationRequest, UnlockRequest,
    UnlockResponse,
};
