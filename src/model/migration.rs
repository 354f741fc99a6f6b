use super::impl_entity;
use crate::core::{new_id, now_millis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a cross-cluster installation migration.
///
/// Forward order is the declaration order; `Stable` and `CreationFailed` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationState {
    CreationRequested,
    CreationComplete,
    SnapshotCreationInProgress,
    SnapshotCreationComplete,
    RestoreDatabaseInProgress,
    RestoreDatabaseComplete,
    Stable,
    CreationFailed,
}

impl MigrationState {
    /// Every state a migration can be in.
    pub const ALL: [MigrationState; 8] = [
        MigrationState::CreationRequested,
        MigrationState::CreationComplete,
        MigrationState::SnapshotCreationInProgress,
        MigrationState::SnapshotCreationComplete,
        MigrationState::RestoreDatabaseInProgress,
        MigrationState::RestoreDatabaseComplete,
        MigrationState::Stable,
        MigrationState::CreationFailed,
    ];

    /// States the migration supervisor acts on during a tick.
    pub const PENDING_WORK: [MigrationState; 6] = [
        MigrationState::CreationRequested,
        MigrationState::CreationComplete,
        MigrationState::SnapshotCreationInProgress,
        MigrationState::SnapshotCreationComplete,
        MigrationState::RestoreDatabaseInProgress,
        MigrationState::RestoreDatabaseComplete,
    ];

    /// States a migration may be put in through the API.
    pub const REQUEST_STATES: [MigrationState; 1] = [MigrationState::CreationRequested];

    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::CreationRequested => "creation-requested",
            MigrationState::CreationComplete => "creation-complete",
            MigrationState::SnapshotCreationInProgress => "snapshot-creation-in-progress",
            MigrationState::SnapshotCreationComplete => "snapshot-creation-complete",
            MigrationState::RestoreDatabaseInProgress => "restore-database-in-progress",
            MigrationState::RestoreDatabaseComplete => "restore-database-complete",
            MigrationState::Stable => "stable",
            MigrationState::CreationFailed => "creation-failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationState::Stable | MigrationState::CreationFailed)
    }

    pub fn is_pending_work(&self) -> bool {
        Self::PENDING_WORK.contains(self)
    }

    /// The single forward successor of this state, `None` for terminal states.
    pub fn successor(&self) -> Option<MigrationState> {
        match self {
            MigrationState::CreationRequested => Some(MigrationState::CreationComplete),
            MigrationState::CreationComplete => Some(MigrationState::SnapshotCreationInProgress),
            MigrationState::SnapshotCreationInProgress => {
                Some(MigrationState::SnapshotCreationComplete)
            }
            MigrationState::SnapshotCreationComplete => {
                Some(MigrationState::RestoreDatabaseInProgress)
            }
            MigrationState::RestoreDatabaseInProgress => {
                Some(MigrationState::RestoreDatabaseComplete)
            }
            MigrationState::RestoreDatabaseComplete => Some(MigrationState::Stable),
            MigrationState::Stable | MigrationState::CreationFailed => None,
        }
    }

    /// Whether `next` is a legal result of one transition from `self`.
    pub fn can_transition_to(&self, next: MigrationState) -> bool {
        if self.is_terminal() {
            return next == *self;
        }
        next == *self || Some(next) == self.successor() || next == MigrationState::CreationFailed
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single in-flight move of one cluster installation to a destination cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub id: String,
    /// Destination cluster.
    pub cluster_id: String,
    /// Source placement being migrated.
    pub cluster_installation_id: String,
    pub state: MigrationState,
    pub lock_acquired_by: Option<String>,
    pub lock_acquired_at: Option<i64>,
    pub create_at: i64,
    pub delete_at: Option<i64>,
}

impl Migration {
    /// Builds a new migration in `CreationRequested`.
    pub fn new(cluster_id: impl Into<String>, cluster_installation_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            cluster_id: cluster_id.into(),
            cluster_installation_id: cluster_installation_id.into(),
            state: MigrationState::CreationRequested,
            lock_acquired_by: None,
            lock_acquired_at: None,
            create_at: now_millis(),
            delete_at: None,
        }
    }
}

impl_entity!(Migration, "migration");
