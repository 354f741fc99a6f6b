use super::impl_entity;
use crate::core::{new_id, now_millis};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterInstallationState {
    CreationRequested,
    Reconciling,
    Stable,
    CreationFailed,
    DeletionRequested,
    DeletionFailed,
    Deleted,
}

impl ClusterInstallationState {
    pub const PENDING_WORK: [ClusterInstallationState; 3] = [
        ClusterInstallationState::CreationRequested,
        ClusterInstallationState::Reconciling,
        ClusterInstallationState::DeletionRequested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterInstallationState::CreationRequested => "creation-requested",
            ClusterInstallationState::Reconciling => "reconciling",
            ClusterInstallationState::Stable => "stable",
            ClusterInstallationState::CreationFailed => "creation-failed",
            ClusterInstallationState::DeletionRequested => "deletion-requested",
            ClusterInstallationState::DeletionFailed => "deletion-failed",
            ClusterInstallationState::Deleted => "deleted",
        }
    }

    pub fn is_pending_work(&self) -> bool {
        Self::PENDING_WORK.contains(self)
    }
}

impl fmt::Display for ClusterInstallationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The binding of an installation to one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInstallation {
    pub id: String,
    pub cluster_id: String,
    pub installation_id: String,
    pub namespace: String,
    pub state: ClusterInstallationState,
    pub lock_acquired_by: Option<String>,
    pub lock_acquired_at: Option<i64>,
    pub create_at: i64,
    pub delete_at: Option<i64>,
}

impl ClusterInstallation {
    /// New placement in `CreationRequested`; the namespace is the installation id.
    pub fn new(cluster_id: impl Into<String>, installation_id: impl Into<String>) -> Self {
        let installation_id = installation_id.into();
        Self {
            id: new_id(),
            cluster_id: cluster_id.into(),
            namespace: installation_id.clone(),
            installation_id,
            state: ClusterInstallationState::CreationRequested,
            lock_acquired_by: None,
            lock_acquired_at: None,
            create_at: now_millis(),
            delete_at: None,
        }
    }
}

impl_entity!(ClusterInstallation, "cluster installation");
