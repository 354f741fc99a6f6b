//! Migration control logic for installations backed by a dedicated RDS cluster.
//!
//! The source database is the installation's cloud cluster (`cloud-<id>`);
//! the replica is restored as `cloud-<id>-migrated` with a single
//! `cloud-<id>-migrated-master` instance inside the destination cluster's
//! VPC. Snapshots and the replica are tagged with the migration id so a
//! migration never adopts another migration's resources.

use super::{DatabaseMigration, DatabaseMigrationError, DatabaseMigrationStatus, MigrationResult};
use crate::cloud::{
    CloudError, CreateDbInstanceRequest, DbClusterSnapshot, MIGRATION_ID_TAG_KEY, RdsClient,
    ResourceStatus, RestoreDbClusterRequest, SNAPSHOT_TAG_KEY, SNAPSHOT_TYPE_MANUAL, Tag,
    VPC_AVAILABLE_TAG_KEY, VPC_AVAILABLE_TAG_VALUE_FALSE, VPC_CLUSTER_ID_TAG_KEY,
    db_subnet_group_name, has_tag, snapshot_tag_value,
};
use crate::core::{cloud_id, new_id};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Level, event};

pub struct RdsDatabaseMigration {
    rds: Arc<dyn RdsClient>,
    migration_id: String,
    master_db_cluster_id: String,
    replica_db_cluster_id: String,
    replica_instance_id: String,
    destination_cluster_id: String,
}

impl RdsDatabaseMigration {
    pub fn new(
        rds: Arc<dyn RdsClient>,
        installation_id: &str,
        destination_cluster_id: &str,
        migration_id: &str,
    ) -> Self {
        let master_db_cluster_id = cloud_id(installation_id);
        Self {
            rds,
            migration_id: migration_id.to_string(),
            replica_db_cluster_id: format!("{master_db_cluster_id}-migrated"),
            replica_instance_id: format!("{master_db_cluster_id}-migrated-master"),
            master_db_cluster_id,
            destination_cluster_id: destination_cluster_id.to_string(),
        }
    }

    pub fn master_db_cluster_id(&self) -> &str {
        &self.master_db_cluster_id
    }

    pub fn replica_db_cluster_id(&self) -> &str {
        &self.replica_db_cluster_id
    }

    pub fn replica_instance_id(&self) -> &str {
        &self.replica_instance_id
    }

    fn snapshot_tags(&self) -> Vec<Tag> {
        vec![
            Tag::new(SNAPSHOT_TAG_KEY, snapshot_tag_value(&self.master_db_cluster_id)),
            Tag::new(MIGRATION_ID_TAG_KEY, &self.migration_id),
        ]
    }

    /// Most recent manual snapshot tagged for both this source database and
    /// this migration.
    async fn most_recent_snapshot(&self) -> MigrationResult<Option<DbClusterSnapshot>> {
        let expected = snapshot_tag_value(&self.master_db_cluster_id);
        let mut candidates = Vec::new();
        for snapshot in self
            .rds
            .describe_db_cluster_snapshots(SNAPSHOT_TYPE_MANUAL)
            .await?
        {
            let tags = self.rds.list_tags_for_resource(&snapshot.arn).await?;
            if has_tag(&tags, SNAPSHOT_TAG_KEY, &expected)
                && has_tag(&tags, MIGRATION_ID_TAG_KEY, &self.migration_id)
            {
                candidates.push(snapshot);
            }
        }
        candidates.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right.id.cmp(&left.id))
        });
        Ok(candidates.into_iter().next())
    }

    /// The single VPC owned by the destination cluster.
    async fn destination_vpc_id(&self) -> MigrationResult<String> {
        let mut vpcs = self
            .rds
            .describe_vpcs(&[
                Tag::new(VPC_CLUSTER_ID_TAG_KEY, &self.destination_cluster_id),
                Tag::new(VPC_AVAILABLE_TAG_KEY, VPC_AVAILABLE_TAG_VALUE_FALSE),
            ])
            .await?;
        if vpcs.len() != 1 {
            return Err(DatabaseMigrationError::Terminal(format!(
                "expected 1 VPC for cluster {}, found {}",
                self.destination_cluster_id,
                vpcs.len()
            )));
        }
        Ok(vpcs.remove(0).id)
    }

    /// Whether the replica cluster still has to be restored. An existing
    /// replica is only adopted when it carries this migration's tag.
    async fn replica_needs_restore(&self) -> MigrationResult<bool> {
        match self.rds.describe_db_cluster(&self.replica_db_cluster_id).await {
            Ok(existing) if existing.status == ResourceStatus::Deleting => {
                Err(DatabaseMigrationError::Pending(format!(
                    "DB cluster {} is still being deleted",
                    self.replica_db_cluster_id
                )))
            }
            Ok(existing) if has_tag(&existing.tags, MIGRATION_ID_TAG_KEY, &self.migration_id) => {
                event!(
                    Level::DEBUG,
                    db_cluster = %self.replica_db_cluster_id,
                    "replica DB cluster already restored"
                );
                Ok(false)
            }
            Ok(_) => Err(DatabaseMigrationError::Terminal(format!(
                "DB cluster {} already exists and belongs to someone else",
                self.replica_db_cluster_id
            ))),
            Err(CloudError::NotFound(_)) => Ok(true),
            Err(err) => Err(err.into()),
        }
    }

    async fn restore_replica(&self) -> MigrationResult<()> {
        let vpc_id = self.destination_vpc_id().await?;

        let snapshot = self.most_recent_snapshot().await?.ok_or_else(|| {
            DatabaseMigrationError::Terminal(format!(
                "DB cluster {} has no snapshot for migration {}",
                self.master_db_cluster_id, self.migration_id
            ))
        })?;
        match &snapshot.status {
            ResourceStatus::Available => {}
            ResourceStatus::Creating | ResourceStatus::Modifying => {
                return Err(DatabaseMigrationError::Pending(format!(
                    "snapshot {} is {}",
                    snapshot.id, snapshot.status
                )));
            }
            status => {
                return Err(DatabaseMigrationError::Terminal(format!(
                    "snapshot {} is {}",
                    snapshot.id, status
                )));
            }
        }

        let security_group_ids = self
            .rds
            .describe_db_security_groups(&vpc_id)
            .await?
            .into_iter()
            .map(|group| group.id)
            .collect::<Vec<_>>();
        if security_group_ids.is_empty() {
            return Err(DatabaseMigrationError::Terminal(format!(
                "no database security groups in VPC {vpc_id}"
            )));
        }

        let subnet_group_name = db_subnet_group_name(&vpc_id);
        let subnet_groups = self.rds.describe_db_subnet_groups().await?;
        if !subnet_groups.iter().any(|group| group.name == subnet_group_name) {
            return Err(DatabaseMigrationError::Terminal(format!(
                "no database subnet group {subnet_group_name}"
            )));
        }

        event!(
            Level::DEBUG,
            snapshot = %snapshot.id,
            db_cluster = %self.replica_db_cluster_id,
            "restoring replica DB cluster from snapshot"
        );
        let request = RestoreDbClusterRequest {
            db_cluster_id: self.replica_db_cluster_id.clone(),
            snapshot_id: snapshot.id,
            subnet_group_name,
            security_group_ids,
            tags: vec![Tag::new(MIGRATION_ID_TAG_KEY, &self.migration_id)],
        };
        match self.rds.restore_db_cluster_from_snapshot(&request).await {
            Ok(_) | Err(CloudError::AlreadyExists(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn ensure_replica_instance(&self) -> MigrationResult<()> {
        match self.rds.describe_db_instance(&self.replica_instance_id).await {
            Ok(_) => {
                event!(
                    Level::DEBUG,
                    db_instance = %self.replica_instance_id,
                    "replica DB instance already created"
                );
                return Ok(());
            }
            Err(CloudError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        let request = CreateDbInstanceRequest {
            db_cluster_id: self.replica_db_cluster_id.clone(),
            instance_id: self.replica_instance_id.clone(),
        };
        match self.rds.create_db_instance(&request).await {
            Ok(_) | Err(CloudError::AlreadyExists(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl DatabaseMigration for RdsDatabaseMigration {
    async fn snapshot(&self) -> MigrationResult<()> {
        if let Some(existing) = self.most_recent_snapshot().await? {
            if existing.status != ResourceStatus::Deleting {
                event!(
                    Level::DEBUG,
                    snapshot = %existing.id,
                    status = %existing.status,
                    "snapshot already requested"
                );
                return Ok(());
            }
        }

        let snapshot_id = format!("{}-snapshot-{}", self.master_db_cluster_id, new_id());
        match self
            .rds
            .create_db_cluster_snapshot(&self.master_db_cluster_id, &snapshot_id, &self.snapshot_tags())
            .await
        {
            Ok(_) | Err(CloudError::AlreadyExists(_)) => {}
            Err(err) => return Err(err.into()),
        }
        event!(
            Level::INFO,
            db_cluster = %self.master_db_cluster_id,
            snapshot = %snapshot_id,
            "RDS database snapshot in progress"
        );
        Ok(())
    }

    /// Polled only after [`Self::snapshot`] succeeded, so a missing snapshot
    /// was deleted and counts as failing.
    async fn snapshot_status(&self) -> MigrationResult<DatabaseMigrationStatus> {
        let Some(snapshot) = self.most_recent_snapshot().await? else {
            event!(
                Level::ERROR,
                db_cluster = %self.master_db_cluster_id,
                migration = %self.migration_id,
                "snapshot disappeared"
            );
            return Ok(DatabaseMigrationStatus::Failing);
        };
        let status = match &snapshot.status {
            ResourceStatus::Available => DatabaseMigrationStatus::Ready,
            ResourceStatus::Creating | ResourceStatus::Modifying => {
                DatabaseMigrationStatus::InProgress
            }
            status => {
                event!(
                    Level::ERROR,
                    snapshot = %snapshot.id,
                    status = %status,
                    "snapshot can no longer be used"
                );
                DatabaseMigrationStatus::Failing
            }
        };
        Ok(status)
    }

    async fn restore(&self) -> MigrationResult<()> {
        if self.replica_needs_restore().await? {
            self.restore_replica().await?;
        }
        self.ensure_replica_instance().await?;
        event!(
            Level::INFO,
            db_cluster = %self.replica_db_cluster_id,
            source = %self.master_db_cluster_id,
            "RDS DB cluster is being restored"
        );
        Ok(())
    }

    /// Polled only after [`Self::restore`] succeeded: a missing replica
    /// cluster or instance was deleted underneath the migration.
    async fn database_status(&self) -> MigrationResult<DatabaseMigrationStatus> {
        let endpoints = match self
            .rds
            .describe_db_cluster_endpoints(&self.replica_db_cluster_id)
            .await
        {
            Ok(endpoints) => endpoints,
            Err(CloudError::NotFound(_)) => {
                event!(
                    Level::ERROR,
                    db_cluster = %self.replica_db_cluster_id,
                    "replica DB cluster disappeared"
                );
                return Ok(DatabaseMigrationStatus::Failing);
            }
            Err(err) => return Err(err.into()),
        };
        if endpoints.is_empty() {
            event!(
                Level::ERROR,
                db_cluster = %self.replica_db_cluster_id,
                "replica DB cluster has no endpoints"
            );
            return Ok(DatabaseMigrationStatus::Failing);
        }
        for endpoint in &endpoints {
            match &endpoint.status {
                ResourceStatus::Available => {}
                ResourceStatus::Creating => return Ok(DatabaseMigrationStatus::InProgress),
                status => {
                    event!(
                        Level::ERROR,
                        endpoint = %endpoint.address,
                        status = %status,
                        "replica endpoint is not coming up"
                    );
                    return Ok(DatabaseMigrationStatus::Failing);
                }
            }
        }

        let instance = match self.rds.describe_db_instance(&self.replica_instance_id).await {
            Ok(instance) => instance,
            Err(CloudError::NotFound(_)) => {
                event!(
                    Level::ERROR,
                    db_instance = %self.replica_instance_id,
                    "replica DB instance disappeared"
                );
                return Ok(DatabaseMigrationStatus::Failing);
            }
            Err(err) => return Err(err.into()),
        };
        match &instance.status {
            ResourceStatus::Available => Ok(DatabaseMigrationStatus::Ready),
            ResourceStatus::Creating => Ok(DatabaseMigrationStatus::InProgress),
            status => {
                event!(
                    Level::ERROR,
                    db_instance = %instance.id,
                    status = %status,
                    "replica instance is not coming up"
                );
                Ok(DatabaseMigrationStatus::Failing)
            }
        }
    }

    async fn teardown(&self) -> MigrationResult<()> {
        match self.rds.delete_db_instance(&self.replica_instance_id).await {
            Ok(()) | Err(CloudError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        match self.rds.delete_db_cluster(&self.replica_db_cluster_id).await {
            Ok(()) | Err(CloudError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        event!(
            Level::INFO,
            db_cluster = %self.replica_db_cluster_id,
            "replica DB cluster removed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::InMemoryRds;

    fn migration_for(rds: &InMemoryRds) -> RdsDatabaseMigration {
        RdsDatabaseMigration::new(Arc::new(rds.clone()), "inst1", "dest", "mig1")
    }

    #[test]
    fn resource_names_derive_from_the_installation() {
        let capability = migration_for(&InMemoryRds::new());
        assert_eq!(capability.master_db_cluster_id(), "cloud-inst1");
        assert_eq!(capability.replica_db_cluster_id(), "cloud-inst1-migrated");
        assert_eq!(capability.replica_instance_id(), "cloud-inst1-migrated-master");
    }

    #[tokio::test]
    async fn missing_snapshot_is_failing() {
        let capability = migration_for(&InMemoryRds::new());
        assert_eq!(
            capability.snapshot_status().await,
            Ok(DatabaseMigrationStatus::Failing)
        );
    }

    #[tokio::test]
    async fn restore_without_snapshot_is_terminal() {
        let rds = InMemoryRds::new();
        rds.add_cluster_network("dest").await;
        assert!(matches!(
            migration_for(&rds).restore().await,
            Err(DatabaseMigrationError::Terminal(_))
        ));
        assert_eq!(rds.calls().await.restore_cluster, 0);
    }

    #[tokio::test]
    async fn restore_without_destination_network_is_terminal() {
        let rds = InMemoryRds::new();
        let capability = migration_for(&rds);
        capability.snapshot().await.unwrap();
        assert!(matches!(
            capability.restore().await,
            Err(DatabaseMigrationError::Terminal(_))
        ));
        assert_eq!(rds.calls().await.restore_cluster, 0);
    }

    #[tokio::test]
    async fn teardown_tolerates_missing_replica() {
        let rds = InMemoryRds::new();
        migration_for(&rds).teardown().await.unwrap();
        assert_eq!(rds.calls().await.delete_cluster, 1);
    }
}
