use super::{Supervisor, release};
use crate::core::Result;
use crate::model::{ClusterInstallation, ClusterInstallationState};
use crate::provisioning::ClusterInstallationProvisioner;
use crate::store::{
    ClusterInstallationFilter, ClusterInstallationStore, ClusterStore, EntityLock,
    InstallationStore, LockTarget, Store,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Drives placements of installations onto clusters.
pub struct ClusterInstallationSupervisor {
    store: Arc<dyn Store>,
    provisioner: Arc<dyn ClusterInstallationProvisioner>,
    instance_id: String,
}

impl ClusterInstallationSupervisor {
    pub fn new(
        store: Arc<dyn Store>,
        provisioner: Arc<dyn ClusterInstallationProvisioner>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provisioner,
            instance_id: instance_id.into(),
        }
    }

    /// Returns the live placement of `installation_id` on `cluster_id`,
    /// creating one in `CreationRequested` if there is none. Placements being
    /// deleted do not count.
    pub async fn ensure_cluster_installation(
        store: &dyn Store,
        installation_id: &str,
        cluster_id: &str,
    ) -> Result<ClusterInstallation> {
        let filter = ClusterInstallationFilter {
            cluster_id: Some(cluster_id.to_string()),
            installation_id: Some(installation_id.to_string()),
            include_deleted: false,
        };
        let existing = store
            .get_cluster_installations(&filter)
            .await?
            .into_iter()
            .find(|ci| {
                !matches!(
                    ci.state,
                    ClusterInstallationState::DeletionRequested
                        | ClusterInstallationState::DeletionFailed
                        | ClusterInstallationState::Deleted
                )
            });
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let cluster_installation = ClusterInstallation::new(cluster_id, installation_id);
        store
            .create_cluster_installation(&cluster_installation)
            .await?;
        event!(
            Level::INFO,
            cluster_installation = %cluster_installation.id,
            installation = %installation_id,
            cluster = %cluster_id,
            "created cluster installation"
        );
        Ok(cluster_installation)
    }

    pub async fn supervise(&self, cluster_installation: &ClusterInstallation) {
        let span = info_span!(
            "supervise_cluster_installation",
            cluster_installation = %cluster_installation.id,
            instance = %self.instance_id
        );
        async {
            let lock = match EntityLock::try_lock(
                Arc::clone(&self.store),
                LockTarget::ClusterInstallation,
                &cluster_installation.id,
                &self.instance_id,
            )
            .await
            {
                Ok(Some(lock)) => lock,
                Ok(None) => return,
                Err(err) => {
                    event!(Level::WARN, error = %err, "failed to claim cluster installation");
                    return;
                }
            };
            if let Err(err) = self.supervise_locked(&cluster_installation.id).await {
                event!(Level::WARN, error = %err, "failed to supervise cluster installation");
            }
            release(lock).await;
        }
        .instrument(span)
        .await
    }

    async fn supervise_locked(&self, id: &str) -> Result<()> {
        let Some(mut cluster_installation) = self.store.get_cluster_installation(id).await? else {
            return Ok(());
        };
        if cluster_installation.delete_at.is_some() {
            return Ok(());
        }

        let current = cluster_installation.state;
        let next = self.transition(&cluster_installation).await;
        if next == current {
            return Ok(());
        }
        cluster_installation.state = next;
        self.store
            .update_cluster_installation(&cluster_installation)
            .await?;
        if next == ClusterInstallationState::Deleted {
            self.store.delete_cluster_installation(id).await?;
        }
        event!(
            Level::INFO,
            from = %current,
            to = %next,
            "cluster installation transitioned"
        );
        Ok(())
    }

    async fn transition(&self, ci: &ClusterInstallation) -> ClusterInstallationState {
        let cluster = match self.store.get_cluster(&ci.cluster_id).await {
            Ok(Some(cluster)) => cluster,
            Ok(None) => {
                event!(Level::ERROR, cluster = %ci.cluster_id, "cluster does not exist");
                return failed_state(ci.state);
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "failed to load cluster");
                return ci.state;
            }
        };

        match ci.state {
            ClusterInstallationState::CreationRequested => {
                let installation = match self.store.get_installation(&ci.installation_id).await {
                    Ok(Some(installation)) => installation,
                    Ok(None) => {
                        event!(
                            Level::ERROR,
                            installation = %ci.installation_id,
                            "installation does not exist"
                        );
                        return ClusterInstallationState::CreationFailed;
                    }
                    Err(err) => {
                        event!(Level::WARN, error = %err, "failed to load installation");
                        return ci.state;
                    }
                };
                match self
                    .provisioner
                    .create_cluster_installation(&cluster, &installation, ci)
                    .await
                {
                    Ok(()) => ClusterInstallationState::Reconciling,
                    Err(err) => {
                        event!(Level::ERROR, error = %err, "failed to create cluster installation");
                        ClusterInstallationState::CreationFailed
                    }
                }
            }
            ClusterInstallationState::Reconciling => {
                match self.provisioner.is_cluster_installation_ready(&cluster, ci).await {
                    Ok(true) => ClusterInstallationState::Stable,
                    Ok(false) => {
                        event!(Level::DEBUG, "cluster installation is still reconciling");
                        ci.state
                    }
                    Err(err) => {
                        event!(Level::WARN, error = %err, "failed to check cluster installation");
                        ci.state
                    }
                }
            }
            ClusterInstallationState::DeletionRequested => {
                match self.provisioner.delete_cluster_installation(&cluster, ci).await {
                    Ok(()) => ClusterInstallationState::Deleted,
                    Err(err) => {
                        event!(Level::ERROR, error = %err, "failed to delete cluster installation");
                        ClusterInstallationState::DeletionFailed
                    }
                }
            }
            state => state,
        }
    }
}

fn failed_state(state: ClusterInstallationState) -> ClusterInstallationState {
    match state {
        ClusterInstallationState::DeletionRequested => ClusterInstallationState::DeletionFailed,
        ClusterInstallationState::CreationRequested | ClusterInstallationState::Reconciling => {
            ClusterInstallationState::CreationFailed
        }
        state => state,
    }
}

#[async_trait]
impl Supervisor for ClusterInstallationSupervisor {
    fn name(&self) -> &'static str {
        "cluster_installation"
    }

    async fn do_work(&self) -> Result<()> {
        let pending = match self
            .store
            .get_unlocked_cluster_installations_pending_work()
            .await
        {
            Ok(pending) => pending,
            Err(err) => {
                event!(Level::WARN, error = %err, "failed to list cluster installations");
                return Ok(());
            }
        };
        for cluster_installation in &pending {
            self.supervise(cluster_installation).await;
        }
        Ok(())
    }
}
