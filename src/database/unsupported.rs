use super::{DatabaseMigration, DatabaseMigrationError, DatabaseMigrationStatus, MigrationResult};
use crate::model::DatabaseBackendKind;
use async_trait::async_trait;

/// Capability for backends that cannot be migrated; every call fails.
#[derive(Debug, Clone, Copy)]
pub struct UnsupportedDatabaseMigration {
    kind: DatabaseBackendKind,
}

impl UnsupportedDatabaseMigration {
    pub fn new(kind: DatabaseBackendKind) -> Self {
        Self { kind }
    }

    fn fail<T>(&self) -> MigrationResult<T> {
        Err(DatabaseMigrationError::NotSupported(self.kind))
    }
}

#[async_trait]
impl DatabaseMigration for UnsupportedDatabaseMigration {
    async fn snapshot(&self) -> MigrationResult<()> {
        self.fail()
    }

    async fn snapshot_status(&self) -> MigrationResult<DatabaseMigrationStatus> {
        self.fail()
    }

    async fn restore(&self) -> MigrationResult<()> {
        self.fail()
    }

    async fn database_status(&self) -> MigrationResult<DatabaseMigrationStatus> {
        self.fail()
    }

    async fn teardown(&self) -> MigrationResult<()> {
        self.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_operation_is_refused() {
        let capability = UnsupportedDatabaseMigration::new(DatabaseBackendKind::InClusterMysql);
        let expected = DatabaseMigrationError::NotSupported(DatabaseBackendKind::InClusterMysql);
        assert_eq!(capability.snapshot().await, Err(expected.clone()));
        assert_eq!(capability.snapshot_status().await, Err(expected.clone()));
        assert_eq!(capability.restore().await, Err(expected.clone()));
        assert_eq!(capability.database_status().await, Err(expected.clone()));
        assert_eq!(capability.teardown().await, Err(expected));
    }
}
