//! Cloud database service seam.
//!
//! [`RdsClient`] is the narrow slice of the managed database and network APIs
//! the migration control logic needs. Production deployments plug an SDK
//! backed client in here; [`InMemoryRds`] emulates the service in-process.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryRds;

/// VPC tag naming the cluster that owns the VPC.
pub const VPC_CLUSTER_ID_TAG_KEY: &str = "CloudClusterID";
/// VPC tag telling whether the VPC is still free for a new cluster.
pub const VPC_AVAILABLE_TAG_KEY: &str = "Available";
pub const VPC_AVAILABLE_TAG_VALUE_FALSE: &str = "false";

/// Security groups carrying this tag may be attached to tenant databases.
pub const DB_SECURITY_GROUP_TAG_KEY: &str = "InstallationDatabase";
pub const DB_SECURITY_GROUP_TAG_VALUE: &str = "MYSQL/Aurora";

/// Subnet groups are named after the VPC they live in.
pub const DB_SUBNET_GROUP_NAME_PREFIX: &str = "provisioner-db-";

pub const SNAPSHOT_TAG_KEY: &str = "ClusterInstallationSnapshot";
pub const MIGRATION_ID_TAG_KEY: &str = "MigrationID";
pub const SNAPSHOT_TYPE_MANUAL: &str = "manual";

pub fn snapshot_tag_value(db_cluster_id: &str) -> String {
    format!("rds-snapshot-{db_cluster_id}")
}

pub fn db_subnet_group_name(vpc_id: &str) -> String {
    format!("{DB_SUBNET_GROUP_NAME_PREFIX}{vpc_id}")
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Cloud API error: {0}")]
    Api(String),
}

pub type CloudResult<T> = std::result::Result<T, CloudError>;

/// Lifecycle status reported for snapshots, clusters, endpoints and instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceStatus {
    Available,
    Creating,
    Modifying,
    Deleting,
    Other(String),
}

impl ResourceStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "available" => ResourceStatus::Available,
            "creating" => ResourceStatus::Creating,
            "modifying" => ResourceStatus::Modifying,
            "deleting" => ResourceStatus::Deleting,
            other => ResourceStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResourceStatus::Available => "available",
            ResourceStatus::Creating => "creating",
            ResourceStatus::Modifying => "modifying",
            ResourceStatus::Deleting => "deleting",
            ResourceStatus::Other(other) => other,
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

pub fn has_tag(tags: &[Tag], key: &str, value: &str) -> bool {
    tags.iter().any(|tag| tag.key == key && tag.value == value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vpc {
    pub id: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub id: String,
    pub vpc_id: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSubnetGroup {
    pub name: String,
    pub vpc_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbClusterSnapshot {
    pub id: String,
    pub arn: String,
    pub db_cluster_id: String,
    pub snapshot_type: String,
    pub status: ResourceStatus,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbCluster {
    pub id: String,
    pub status: ResourceStatus,
    pub snapshot_id: Option<String>,
    pub subnet_group_name: Option<String>,
    pub members: Vec<String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbClusterEndpoint {
    pub address: String,
    pub endpoint_type: String,
    pub status: ResourceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbInstance {
    pub id: String,
    pub db_cluster_id: String,
    pub status: ResourceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreDbClusterRequest {
    pub db_cluster_id: String,
    pub snapshot_id: String,
    pub subnet_group_name: String,
    pub security_group_ids: Vec<String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDbInstanceRequest {
    pub db_cluster_id: String,
    pub instance_id: String,
}

/// Managed database service operations used by the migration control logic.
///
/// Describe calls for a single resource answer [`CloudError::NotFound`] when
/// it does not exist; create calls answer [`CloudError::AlreadyExists`].
#[async_trait]
pub trait RdsClient: Send + Sync {
    /// VPCs carrying every one of the given tags.
    async fn describe_vpcs(&self, tag_filters: &[Tag]) -> CloudResult<Vec<Vpc>>;
    /// Security groups in `vpc_id` tagged for database use.
    async fn describe_db_security_groups(&self, vpc_id: &str) -> CloudResult<Vec<SecurityGroup>>;
    async fn describe_db_subnet_groups(&self) -> CloudResult<Vec<DbSubnetGroup>>;

    async fn create_db_cluster_snapshot(
        &self,
        db_cluster_id: &str,
        snapshot_id: &str,
        tags: &[Tag],
    ) -> CloudResult<DbClusterSnapshot>;
    async fn describe_db_cluster_snapshots(
        &self,
        snapshot_type: &str,
    ) -> CloudResult<Vec<DbClusterSnapshot>>;
    async fn list_tags_for_resource(&self, arn: &str) -> CloudResult<Vec<Tag>>;

    async fn restore_db_cluster_from_snapshot(
        &self,
        request: &RestoreDbClusterRequest,
    ) -> CloudResult<DbCluster>;
    async fn describe_db_cluster(&self, db_cluster_id: &str) -> CloudResult<DbCluster>;
    async fn describe_db_cluster_endpoints(
        &self,
        db_cluster_id: &str,
    ) -> CloudResult<Vec<DbClusterEndpoint>>;
    async fn delete_db_cluster(&self, db_cluster_id: &str) -> CloudResult<()>;

    async fn create_db_instance(&self, request: &CreateDbInstanceRequest) -> CloudResult<DbInstance>;
    async fn describe_db_instance(&self, instance_id: &str) -> CloudResult<DbInstance>;
    async fn delete_db_instance(&self, instance_id: &str) -> CloudResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_keeps_unknown_values() {
        assert_eq!(ResourceStatus::parse("available"), ResourceStatus::Available);
        assert_eq!(
            ResourceStatus::parse("incompatible-restore"),
            ResourceStatus::Other("incompatible-restore".to_string())
        );
        assert_eq!(ResourceStatus::parse("backing-up").as_str(), "backing-up");
    }

    #[test]
    fn tag_matching_is_exact() {
        let tags = vec![Tag::new(SNAPSHOT_TAG_KEY, snapshot_tag_value("cloud-a"))];
        assert!(has_tag(&tags, SNAPSHOT_TAG_KEY, "rds-snapshot-cloud-a"));
        assert!(!has_tag(&tags, SNAPSHOT_TAG_KEY, "rds-snapshot-cloud-ab"));
    }
}
