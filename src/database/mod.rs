//! Database Migration Capability.
//!
//! A [`DatabaseMigration`] moves one installation's database next to a
//! destination cluster: snapshot the source, restore a replica from it, and
//! report readiness. Every call is a single request or poll; nothing here
//! waits on the cloud.

use crate::cloud::{CloudError, RdsClient};
use crate::model::{DatabaseBackendKind, Installation, Migration};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod rds;
pub mod unsupported;

pub use rds::RdsDatabaseMigration;
pub use unsupported::UnsupportedDatabaseMigration;

/// Readiness of a snapshot or restored database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseMigrationStatus {
    InProgress,
    Ready,
    Failing,
}

impl fmt::Display for DatabaseMigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseMigrationStatus::InProgress => f.write_str("in-progress"),
            DatabaseMigrationStatus::Ready => f.write_str("ready"),
            DatabaseMigrationStatus::Failing => f.write_str("failing"),
        }
    }
}

/// How the migration state machine reacts to a capability error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Expected wait; stay in the current state.
    Transient,
    /// Infrastructure hiccup; stay in the current state and warn.
    Retryable,
    /// Retrying cannot help; the migration fails.
    Terminal,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseMigrationError {
    #[error("database backend {0} does not support migration")]
    NotSupported(DatabaseBackendKind),

    #[error("Pending: {0}")]
    Pending(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Terminal(String),
}

impl DatabaseMigrationError {
    pub fn class(&self) -> FailureClass {
        match self {
            DatabaseMigrationError::Pending(_) => FailureClass::Transient,
            DatabaseMigrationError::Unavailable(_) => FailureClass::Retryable,
            DatabaseMigrationError::NotSupported(_) | DatabaseMigrationError::Terminal(_) => {
                FailureClass::Terminal
            }
        }
    }
}

impl From<CloudError> for DatabaseMigrationError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::Api(_) | CloudError::NotFound(_) => {
                DatabaseMigrationError::Unavailable(err.to_string())
            }
            CloudError::AlreadyExists(_) | CloudError::InvalidState(_) => {
                DatabaseMigrationError::Terminal(err.to_string())
            }
        }
    }
}

pub type MigrationResult<T> = std::result::Result<T, DatabaseMigrationError>;

/// Backend specific database lifecycle operations of one migration.
#[async_trait]
pub trait DatabaseMigration: Send + Sync {
    /// Requests a snapshot of the source database. A snapshot that is already
    /// in flight counts as success.
    async fn snapshot(&self) -> MigrationResult<()>;

    async fn snapshot_status(&self) -> MigrationResult<DatabaseMigrationStatus>;

    /// Requests the destination replica from the most recent snapshot.
    async fn restore(&self) -> MigrationResult<()>;

    async fn database_status(&self) -> MigrationResult<DatabaseMigrationStatus>;

    /// Removes the destination replica. Missing resources count as removed.
    async fn teardown(&self) -> MigrationResult<()>;
}

/// Builds the capability for an installation's database backend.
pub trait DatabaseMigrationFactory: Send + Sync {
    fn database_migration(
        &self,
        installation: &Installation,
        migration: &Migration,
    ) -> Arc<dyn DatabaseMigration>;
}

/// Dispatches on [`DatabaseBackendKind`]; backends without a migration
/// implementation get one that fails closed.
pub struct CloudDatabaseMigrationFactory {
    rds: Arc<dyn RdsClient>,
}

impl CloudDatabaseMigrationFactory {
    pub fn new(rds: Arc<dyn RdsClient>) -> Self {
        Self { rds }
    }
}

impl DatabaseMigrationFactory for CloudDatabaseMigrationFactory {
    fn database_migration(
        &self,
        installation: &Installation,
        migration: &Migration,
    ) -> Arc<dyn DatabaseMigration> {
        match installation.database {
            DatabaseBackendKind::AwsRds => Arc::new(RdsDatabaseMigration::new(
                Arc::clone(&self.rds),
                &installation.id,
                &migration.cluster_id,
                &migration.id,
            )),
            kind => Arc::new(UnsupportedDatabaseMigration::new(kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_errors_map_to_failure_classes() {
        let api: DatabaseMigrationError = CloudError::Api("throttled".to_string()).into();
        assert_eq!(api.class(), FailureClass::Retryable);

        let conflict: DatabaseMigrationError =
            CloudError::AlreadyExists("DB cluster x".to_string()).into();
        assert_eq!(conflict.class(), FailureClass::Terminal);

        assert_eq!(
            DatabaseMigrationError::Pending("deleting".to_string()).class(),
            FailureClass::Transient
        );
        assert_eq!(
            DatabaseMigrationError::NotSupported(DatabaseBackendKind::InClusterMysql).class(),
            FailureClass::Terminal
        );
    }
}
