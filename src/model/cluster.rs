use super::impl_entity;
use crate::core::{new_id, now_millis};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterState {
    CreationRequested,
    ProvisioningRequested,
    Stable,
    CreationFailed,
    DeletionRequested,
    DeletionFailed,
    Deleted,
}

impl ClusterState {
    pub const PENDING_WORK: [ClusterState; 3] = [
        ClusterState::CreationRequested,
        ClusterState::ProvisioningRequested,
        ClusterState::DeletionRequested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterState::CreationRequested => "creation-requested",
            ClusterState::ProvisioningRequested => "provisioning-requested",
            ClusterState::Stable => "stable",
            ClusterState::CreationFailed => "creation-failed",
            ClusterState::DeletionRequested => "deletion-requested",
            ClusterState::DeletionFailed => "deletion-failed",
            ClusterState::Deleted => "deleted",
        }
    }

    pub fn is_pending_work(&self) -> bool {
        Self::PENDING_WORK.contains(self)
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shared workload cluster installations are placed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub provider: String,
    pub size: String,
    pub state: ClusterState,
    pub lock_acquired_by: Option<String>,
    pub lock_acquired_at: Option<i64>,
    pub create_at: i64,
    pub delete_at: Option<i64>,
}

impl Cluster {
    pub fn new(provider: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            provider: provider.into(),
            size: size.into(),
            state: ClusterState::CreationRequested,
            lock_acquired_by: None,
            lock_acquired_at: None,
            create_at: now_millis(),
            delete_at: None,
        }
    }
}

impl_entity!(Cluster, "cluster");
