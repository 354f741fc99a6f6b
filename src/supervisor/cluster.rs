use super::{Supervisor, release};
use crate::core::Result;
use crate::model::{Cluster, ClusterState};
use crate::provisioning::ClusterProvisioner;
use crate::store::{
    ClusterInstallationFilter, ClusterInstallationStore, ClusterStore, EntityLock, LockTarget,
    Store,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

pub struct ClusterSupervisor {
    store: Arc<dyn Store>,
    provisioner: Arc<dyn ClusterProvisioner>,
    instance_id: String,
}

impl ClusterSupervisor {
    pub fn new(
        store: Arc<dyn Store>,
        provisioner: Arc<dyn ClusterProvisioner>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provisioner,
            instance_id: instance_id.into(),
        }
    }

    pub async fn supervise(&self, cluster: &Cluster) {
        let span = info_span!(
            "supervise_cluster",
            cluster = %cluster.id,
            instance = %self.instance_id
        );
        async {
            let lock = match EntityLock::try_lock(
                Arc::clone(&self.store),
                LockTarget::Cluster,
                &cluster.id,
                &self.instance_id,
            )
            .await
            {
                Ok(Some(lock)) => lock,
                Ok(None) => return,
                Err(err) => {
                    event!(Level::WARN, error = %err, "failed to claim cluster");
                    return;
                }
            };
            if let Err(err) = self.supervise_locked(&cluster.id).await {
                event!(Level::WARN, error = %err, "failed to supervise cluster");
            }
            release(lock).await;
        }
        .instrument(span)
        .await
    }

    async fn supervise_locked(&self, id: &str) -> Result<()> {
        let Some(mut cluster) = self.store.get_cluster(id).await? else {
            return Ok(());
        };
        if cluster.delete_at.is_some() {
            return Ok(());
        }

        let current = cluster.state;
        let next = self.transition(&cluster).await?;
        if next == current {
            return Ok(());
        }
        cluster.state = next;
        self.store.update_cluster(&cluster).await?;
        if next == ClusterState::Deleted {
            self.store.delete_cluster(id).await?;
        }
        event!(Level::INFO, from = %current, to = %next, "cluster transitioned");
        Ok(())
    }

    async fn transition(&self, cluster: &Cluster) -> Result<ClusterState> {
        let next = match cluster.state {
            ClusterState::CreationRequested => match self.provisioner.create_cluster(cluster).await
            {
                Ok(()) => ClusterState::ProvisioningRequested,
                Err(err) => {
                    event!(Level::ERROR, error = %err, "failed to create cluster");
                    ClusterState::CreationFailed
                }
            },
            ClusterState::ProvisioningRequested => {
                match self.provisioner.provision_cluster(cluster).await {
                    Ok(()) => ClusterState::Stable,
                    Err(err) => {
                        event!(Level::ERROR, error = %err, "failed to provision cluster");
                        ClusterState::CreationFailed
                    }
                }
            }
            ClusterState::DeletionRequested => {
                let placed = self
                    .store
                    .get_cluster_installations(&ClusterInstallationFilter::for_cluster(&cluster.id))
                    .await?;
                if !placed.is_empty() {
                    event!(
                        Level::INFO,
                        cluster_installations = placed.len(),
                        "cluster still hosts installations"
                    );
                    return Ok(cluster.state);
                }
                match self.provisioner.delete_cluster(cluster).await {
                    Ok(()) => ClusterState::Deleted,
                    Err(err) => {
                        event!(Level::ERROR, error = %err, "failed to delete cluster");
                        ClusterState::DeletionFailed
                    }
                }
            }
            state => state,
        };
        Ok(next)
    }
}

#[async_trait]
impl Supervisor for ClusterSupervisor {
    fn name(&self) -> &'static str {
        "cluster"
    }

    async fn do_work(&self) -> Result<()> {
        let pending = match self.store.get_unlocked_clusters_pending_work().await {
            Ok(pending) => pending,
            Err(err) => {
                event!(Level::WARN, error = %err, "failed to list clusters");
                return Ok(());
            }
        };
        for cluster in &pending {
            self.supervise(cluster).await;
        }
        Ok(())
    }
}
