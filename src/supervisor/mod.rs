//! Reconciliation supervisors.
//!
//! Each supervisor owns the state machine of one entity type. A tick lists
//! the unlocked entities whose state asks for work, claims each one with the
//! supervisor's instance id, advances it by at most one state, persists the
//! result and releases the claim.

use crate::core::Result;
use crate::store::EntityLock;
use async_trait::async_trait;
use tracing::{Level, event};

pub mod cluster;
pub mod cluster_installation;
pub mod installation;
pub mod migration;
pub mod scheduler;

pub use cluster::ClusterSupervisor;
pub use cluster_installation::ClusterInstallationSupervisor;
pub use installation::InstallationSupervisor;
pub use migration::{MigrationSupervisor, SuperviseOutcome};
pub use scheduler::{Scheduler, SchedulerHandle};

/// One reconciliation loop body, invoked once per scheduler tick.
#[async_trait]
pub trait Supervisor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Processes every entity currently pending work. Errors for individual
    /// entities are logged, never returned.
    async fn do_work(&self) -> Result<()>;
}

/// Releases a claim taken for one tick. A failed release is only logged; the
/// claim then waits for an operator force-unlock.
pub(crate) async fn release(lock: EntityLock) {
    let id = lock.id().to_string();
    if let Err(err) = lock.unlock().await {
        event!(Level::WARN, id = %id, error = %err, "failed to release claim");
    }
}
