use super::cluster_installation::ClusterInstallationSupervisor;
use super::{Supervisor, release};
use crate::core::Result;
use crate::model::{ClusterInstallationState, ClusterState, Installation, InstallationState};
use crate::store::{
    ClusterInstallationFilter, ClusterInstallationStore, ClusterStore, EntityLock,
    InstallationStore, LockTarget, Store,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Places installations on clusters and tears their placements down.
pub struct InstallationSupervisor {
    store: Arc<dyn Store>,
    instance_id: String,
    cluster_resource_threshold: usize,
}

impl InstallationSupervisor {
    /// `cluster_resource_threshold` caps the number of live placements per
    /// cluster when choosing where a new installation goes.
    pub fn new(
        store: Arc<dyn Store>,
        instance_id: impl Into<String>,
        cluster_resource_threshold: usize,
    ) -> Self {
        Self {
            store,
            instance_id: instance_id.into(),
            cluster_resource_threshold,
        }
    }

    pub async fn supervise(&self, installation: &Installation) {
        let span = info_span!(
            "supervise_installation",
            installation = %installation.id,
            instance = %self.instance_id
        );
        async {
            let lock = match EntityLock::try_lock(
                Arc::clone(&self.store),
                LockTarget::Installation,
                &installation.id,
                &self.instance_id,
            )
            .await
            {
                Ok(Some(lock)) => lock,
                Ok(None) => return,
                Err(err) => {
                    event!(Level::WARN, error = %err, "failed to claim installation");
                    return;
                }
            };
            if let Err(err) = self.supervise_locked(&installation.id).await {
                event!(Level::WARN, error = %err, "failed to supervise installation");
            }
            release(lock).await;
        }
        .instrument(span)
        .await
    }

    async fn supervise_locked(&self, id: &str) -> Result<()> {
        let Some(mut installation) = self.store.get_installation(id).await? else {
            return Ok(());
        };
        if installation.delete_at.is_some() {
            return Ok(());
        }

        let current = installation.state;
        let next = self.transition(&installation).await?;
        if next == current {
            return Ok(());
        }
        installation.state = next;
        self.store.update_installation(&installation).await?;
        if next == InstallationState::Deleted {
            self.store.delete_installation(id).await?;
        }
        event!(Level::INFO, from = %current, to = %next, "installation transitioned");
        Ok(())
    }

    async fn transition(&self, installation: &Installation) -> Result<InstallationState> {
        match installation.state {
            InstallationState::CreationRequested
            | InstallationState::CreationNoCompatibleClusters => self.place(installation).await,
            InstallationState::CreationInProgress => self.check_creation(installation).await,
            InstallationState::DeletionRequested => self.request_deletion(installation).await,
            InstallationState::DeletionInProgress => self.check_deletion(installation).await,
            state => Ok(state),
        }
    }

    async fn place(&self, installation: &Installation) -> Result<InstallationState> {
        let placed = self
            .store
            .get_cluster_installations(&ClusterInstallationFilter::for_installation(
                &installation.id,
            ))
            .await?;
        if !placed.is_empty() {
            return Ok(InstallationState::CreationInProgress);
        }

        for cluster in self.store.get_clusters().await? {
            if cluster.state != ClusterState::Stable {
                continue;
            }
            let hosted = self
                .store
                .get_cluster_installations(&ClusterInstallationFilter::for_cluster(&cluster.id))
                .await?;
            if hosted.len() >= self.cluster_resource_threshold {
                event!(
                    Level::DEBUG,
                    cluster = %cluster.id,
                    hosted = hosted.len(),
                    "cluster is at capacity"
                );
                continue;
            }
            ClusterInstallationSupervisor::ensure_cluster_installation(
                self.store.as_ref(),
                &installation.id,
                &cluster.id,
            )
            .await?;
            return Ok(InstallationState::CreationInProgress);
        }

        event!(Level::INFO, "no cluster can host the installation");
        Ok(InstallationState::CreationNoCompatibleClusters)
    }

    async fn check_creation(&self, installation: &Installation) -> Result<InstallationState> {
        let placed = self
            .store
            .get_cluster_installations(&ClusterInstallationFilter::for_installation(
                &installation.id,
            ))
            .await?;
        if placed
            .iter()
            .any(|ci| ci.state == ClusterInstallationState::CreationFailed)
        {
            return Ok(InstallationState::CreationFailed);
        }
        if !placed.is_empty()
            && placed
                .iter()
                .all(|ci| ci.state == ClusterInstallationState::Stable)
        {
            return Ok(InstallationState::Stable);
        }
        Ok(installation.state)
    }

    /// Marks every placement for deletion. A placement claimed by someone
    /// else keeps the installation in `DeletionRequested` for another tick.
    async fn request_deletion(&self, installation: &Installation) -> Result<InstallationState> {
        let placed = self
            .store
            .get_cluster_installations(&ClusterInstallationFilter::for_installation(
                &installation.id,
            ))
            .await?;
        for ci in placed {
            if matches!(
                ci.state,
                ClusterInstallationState::DeletionRequested | ClusterInstallationState::Deleted
            ) {
                continue;
            }
            let Some(lock) = EntityLock::try_lock(
                Arc::clone(&self.store),
                LockTarget::ClusterInstallation,
                &ci.id,
                &self.instance_id,
            )
            .await?
            else {
                return Ok(installation.state);
            };
            let result = match self.store.get_cluster_installation(&ci.id).await {
                Ok(Some(mut latest)) => {
                    latest.state = ClusterInstallationState::DeletionRequested;
                    self.store.update_cluster_installation(&latest).await
                }
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            };
            release(lock).await;
            result?;
        }
        Ok(InstallationState::DeletionInProgress)
    }

    async fn check_deletion(&self, installation: &Installation) -> Result<InstallationState> {
        let placed = self
            .store
            .get_cluster_installations(&ClusterInstallationFilter::for_installation(
                &installation.id,
            ))
            .await?;
        if placed
            .iter()
            .any(|ci| ci.state == ClusterInstallationState::DeletionFailed)
        {
            return Ok(InstallationState::DeletionFailed);
        }
        if placed.is_empty() {
            return Ok(InstallationState::Deleted);
        }
        Ok(installation.state)
    }
}

#[async_trait]
impl Supervisor for InstallationSupervisor {
    fn name(&self) -> &'static str {
        "installation"
    }

    async fn do_work(&self) -> Result<()> {
        let pending = match self.store.get_unlocked_installations_pending_work().await {
            Ok(pending) => pending,
            Err(err) => {
                event!(Level::WARN, error = %err, "failed to list installations");
                return Ok(());
            }
        };
        for installation in &pending {
            self.supervise(installation).await;
        }
        Ok(())
    }
}
