use super::{DatabaseBackendKind, impl_entity};
use crate::core::{new_id, now_millis};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallationState {
    CreationRequested,
    CreationNoCompatibleClusters,
    CreationInProgress,
    Stable,
    CreationFailed,
    DeletionRequested,
    DeletionInProgress,
    DeletionFailed,
    Deleted,
}

impl InstallationState {
    pub const PENDING_WORK: [InstallationState; 5] = [
        InstallationState::CreationRequested,
        InstallationState::CreationNoCompatibleClusters,
        InstallationState::CreationInProgress,
        InstallationState::DeletionRequested,
        InstallationState::DeletionInProgress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallationState::CreationRequested => "creation-requested",
            InstallationState::CreationNoCompatibleClusters => "creation-no-compatible-clusters",
            InstallationState::CreationInProgress => "creation-in-progress",
            InstallationState::Stable => "stable",
            InstallationState::CreationFailed => "creation-failed",
            InstallationState::DeletionRequested => "deletion-requested",
            InstallationState::DeletionInProgress => "deletion-in-progress",
            InstallationState::DeletionFailed => "deletion-failed",
            InstallationState::Deleted => "deleted",
        }
    }

    pub fn is_pending_work(&self) -> bool {
        Self::PENDING_WORK.contains(self)
    }
}

impl fmt::Display for InstallationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant's logical application instance, independent of placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    pub id: String,
    pub owner_id: String,
    pub dns: String,
    pub database: DatabaseBackendKind,
    pub size: String,
    pub state: InstallationState,
    pub lock_acquired_by: Option<String>,
    pub lock_acquired_at: Option<i64>,
    pub create_at: i64,
    pub delete_at: Option<i64>,
}

impl Installation {
    pub fn new(
        owner_id: impl Into<String>,
        dns: impl Into<String>,
        database: DatabaseBackendKind,
    ) -> Self {
        Self {
            id: new_id(),
            owner_id: owner_id.into(),
            dns: dns.into(),
            database,
            size: "100users".to_string(),
            state: InstallationState::CreationRequested,
            lock_acquired_by: None,
            lock_acquired_at: None,
            create_at: now_millis(),
            delete_at: None,
        }
    }
}

impl_entity!(Installation, "installation");
