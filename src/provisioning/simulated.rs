use super::{ClusterInstallationProvisioner, ClusterProvisioner};
use crate::cloud::InMemoryRds;
use crate::core::{ProvisionerError, Result};
use crate::model::{Cluster, ClusterInstallation, Installation};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Level, event};

/// Provisioner that completes every request instantly.
///
/// When attached to an [`InMemoryRds`] it also creates and removes the
/// network a real cluster would own, so database restores can find it.
#[derive(Clone, Default)]
pub struct SimulatedProvisioner {
    network: Option<InMemoryRds>,
    failure: Arc<Mutex<Option<String>>>,
}

impl SimulatedProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network(rds: InMemoryRds) -> Self {
        Self {
            network: Some(rds),
            failure: Arc::default(),
        }
    }

    /// Makes every following call fail with `message`; `None` heals it.
    pub async fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock().await = message.map(str::to_string);
    }

    async fn check(&self) -> Result<()> {
        match self.failure.lock().await.as_ref() {
            Some(message) => Err(ProvisionerError::Cloud(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClusterProvisioner for SimulatedProvisioner {
    async fn create_cluster(&self, cluster: &Cluster) -> Result<()> {
        self.check().await?;
        if let Some(rds) = &self.network {
            let vpc_id = rds.add_cluster_network(&cluster.id).await;
            event!(Level::DEBUG, cluster = %cluster.id, vpc = %vpc_id, "claimed cluster network");
        }
        Ok(())
    }

    async fn provision_cluster(&self, _cluster: &Cluster) -> Result<()> {
        self.check().await
    }

    async fn delete_cluster(&self, cluster: &Cluster) -> Result<()> {
        self.check().await?;
        if let Some(rds) = &self.network {
            rds.remove_cluster_network(&cluster.id).await;
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterInstallationProvisioner for SimulatedProvisioner {
    async fn create_cluster_installation(
        &self,
        _cluster: &Cluster,
        _installation: &Installation,
        _cluster_installation: &ClusterInstallation,
    ) -> Result<()> {
        self.check().await
    }

    async fn is_cluster_installation_ready(
        &self,
        _cluster: &Cluster,
        _cluster_installation: &ClusterInstallation,
    ) -> Result<bool> {
        self.check().await?;
        Ok(true)
    }

    async fn delete_cluster_installation(
        &self,
        _cluster: &Cluster,
        _cluster_installation: &ClusterInstallation,
    ) -> Result<()> {
        self.check().await
    }
}
