//! Orchestrated-cluster side of provisioning.
//!
//! The entity supervisors drive state; these traits perform the actual work
//! on the workload clusters. Manifest generation and cluster tooling live
//! behind them.

use crate::core::Result;
use crate::model::{Cluster, ClusterInstallation, Installation};
use async_trait::async_trait;

pub mod simulated;

pub use simulated::SimulatedProvisioner;

#[async_trait]
pub trait ClusterProvisioner: Send + Sync {
    /// Creates the cluster's infrastructure (network, control plane).
    async fn create_cluster(&self, cluster: &Cluster) -> Result<()>;
    /// Installs the cluster's base workloads once it exists.
    async fn provision_cluster(&self, cluster: &Cluster) -> Result<()>;
    async fn delete_cluster(&self, cluster: &Cluster) -> Result<()>;
}

#[async_trait]
pub trait ClusterInstallationProvisioner: Send + Sync {
    async fn create_cluster_installation(
        &self,
        cluster: &Cluster,
        installation: &Installation,
        cluster_installation: &ClusterInstallation,
    ) -> Result<()>;

    /// Whether the installation's workload on the cluster is up.
    async fn is_cluster_installation_ready(
        &self,
        cluster: &Cluster,
        cluster_installation: &ClusterInstallation,
    ) -> Result<bool>;

    async fn delete_cluster_installation(
        &self,
        cluster: &Cluster,
        cluster_installation: &ClusterInstallation,
    ) -> Result<()>;
}
