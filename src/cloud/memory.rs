use super::{
    CloudError, CloudResult, CreateDbInstanceRequest, DB_SECURITY_GROUP_TAG_KEY,
    DB_SECURITY_GROUP_TAG_VALUE, DbCluster, DbClusterEndpoint, DbClusterSnapshot, DbInstance,
    DbSubnetGroup, RdsClient, ResourceStatus, RestoreDbClusterRequest, SecurityGroup, Tag,
    VPC_AVAILABLE_TAG_KEY, VPC_AVAILABLE_TAG_VALUE_FALSE, VPC_CLUSTER_ID_TAG_KEY, Vpc,
    db_subnet_group_name, has_tag,
};
use crate::core::{new_id, now_millis};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Number of calls made against each mutating operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RdsCallCounts {
    pub create_snapshot: usize,
    pub restore_cluster: usize,
    pub create_instance: usize,
    pub delete_cluster: usize,
    pub delete_instance: usize,
}

/// A resource that reports `creating` for a number of polls before settling.
#[derive(Debug, Clone)]
struct Settling<T> {
    resource: T,
    polls_remaining: u32,
}

#[derive(Default)]
struct RdsState {
    vpcs: Vec<Vpc>,
    security_groups: Vec<SecurityGroup>,
    subnet_groups: Vec<DbSubnetGroup>,
    snapshots: BTreeMap<String, Settling<DbClusterSnapshot>>,
    tags: HashMap<String, Vec<Tag>>,
    clusters: BTreeMap<String, Settling<DbCluster>>,
    instances: BTreeMap<String, Settling<DbInstance>>,
    last_created_at: i64,
    calls: RdsCallCounts,
    unavailable: bool,
}

impl RdsState {
    fn check_available(&self) -> CloudResult<()> {
        if self.unavailable {
            return Err(CloudError::Api("service unavailable".to_string()));
        }
        Ok(())
    }

    /// Creation timestamps strictly increase so ordering by age is total.
    fn next_created_at(&mut self) -> i64 {
        self.last_created_at = now_millis().max(self.last_created_at + 1);
        self.last_created_at
    }
}

/// In-process emulator of the managed database service.
///
/// New snapshots, clusters and instances report `creating` for
/// `settle_polls` describe calls and `available` afterwards. Source clusters
/// are implicit: snapshotting any cluster id succeeds.
#[derive(Clone, Default)]
pub struct InMemoryRds {
    state: Arc<Mutex<RdsState>>,
    settle_polls: u32,
}

impl InMemoryRds {
    /// Emulator whose resources are available as soon as they are created.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settle_polls(settle_polls: u32) -> Self {
        Self {
            state: Arc::default(),
            settle_polls,
        }
    }

    fn settling<T>(&self, resource: T) -> Settling<T> {
        Settling {
            resource,
            polls_remaining: self.settle_polls,
        }
    }

    fn initial_status(&self) -> ResourceStatus {
        if self.settle_polls == 0 {
            ResourceStatus::Available
        } else {
            ResourceStatus::Creating
        }
    }

    /// Creates the VPC, database security group and subnet group a
    /// provisioned cluster owns. Returns the VPC id.
    pub async fn add_cluster_network(&self, cluster_id: &str) -> String {
        let mut state = self.state.lock().await;
        let vpc_id = format!("vpc-{}", &new_id()[..17]);
        state.vpcs.push(Vpc {
            id: vpc_id.clone(),
            tags: vec![
                Tag::new(VPC_CLUSTER_ID_TAG_KEY, cluster_id),
                Tag::new(VPC_AVAILABLE_TAG_KEY, VPC_AVAILABLE_TAG_VALUE_FALSE),
            ],
        });
        state.security_groups.push(SecurityGroup {
            id: format!("sg-{}", &new_id()[..17]),
            vpc_id: vpc_id.clone(),
            tags: vec![Tag::new(DB_SECURITY_GROUP_TAG_KEY, DB_SECURITY_GROUP_TAG_VALUE)],
        });
        state.subnet_groups.push(DbSubnetGroup {
            name: db_subnet_group_name(&vpc_id),
            vpc_id: vpc_id.clone(),
        });
        vpc_id
    }

    /// Drops the network of a deleted cluster.
    pub async fn remove_cluster_network(&self, cluster_id: &str) {
        let mut state = self.state.lock().await;
        let owned = state
            .vpcs
            .iter()
            .filter(|vpc| has_tag(&vpc.tags, VPC_CLUSTER_ID_TAG_KEY, cluster_id))
            .map(|vpc| vpc.id.clone())
            .collect::<Vec<_>>();
        state.vpcs.retain(|vpc| !owned.contains(&vpc.id));
        state
            .security_groups
            .retain(|group| !owned.contains(&group.vpc_id));
        state
            .subnet_groups
            .retain(|group| !owned.contains(&group.vpc_id));
    }

    /// Stores a snapshot as-is, bypassing settling.
    pub async fn insert_snapshot(&self, snapshot: DbClusterSnapshot, tags: Vec<Tag>) {
        let mut state = self.state.lock().await;
        state.tags.insert(snapshot.arn.clone(), tags);
        state.snapshots.insert(
            snapshot.id.clone(),
            Settling {
                resource: snapshot,
                polls_remaining: 0,
            },
        );
    }

    pub async fn set_snapshot_status(&self, snapshot_id: &str, status: ResourceStatus) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.snapshots.get_mut(snapshot_id) {
            entry.resource.status = status;
            entry.polls_remaining = 0;
        }
    }

    /// Drops a snapshot as if someone deleted it out of band.
    pub async fn remove_snapshot(&self, snapshot_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.snapshots.remove(snapshot_id) {
            state.tags.remove(&entry.resource.arn);
        }
    }

    /// Stores a database cluster as-is, bypassing settling.
    pub async fn insert_db_cluster(&self, cluster: DbCluster) {
        let mut state = self.state.lock().await;
        state.clusters.insert(
            cluster.id.clone(),
            Settling {
                resource: cluster,
                polls_remaining: 0,
            },
        );
    }

    pub async fn set_db_cluster_status(&self, db_cluster_id: &str, status: ResourceStatus) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.clusters.get_mut(db_cluster_id) {
            entry.resource.status = status;
            entry.polls_remaining = 0;
        }
    }

    /// Makes every call fail with an API error until switched back.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    pub async fn calls(&self) -> RdsCallCounts {
        self.state.lock().await.calls
    }

    pub async fn snapshots(&self) -> Vec<DbClusterSnapshot> {
        let state = self.state.lock().await;
        state
            .snapshots
            .values()
            .map(|entry| entry.resource.clone())
            .collect()
    }

    pub async fn db_cluster_exists(&self, db_cluster_id: &str) -> bool {
        self.state.lock().await.clusters.contains_key(db_cluster_id)
    }

    pub async fn db_instance_exists(&self, instance_id: &str) -> bool {
        self.state.lock().await.instances.contains_key(instance_id)
    }
}

/// Advances a settling resource by one poll and returns its current status.
fn poll(status: &mut ResourceStatus, polls_remaining: &mut u32) -> ResourceStatus {
    if *status == ResourceStatus::Creating {
        if *polls_remaining == 0 {
            *status = ResourceStatus::Available;
        } else {
            *polls_remaining -= 1;
        }
    }
    status.clone()
}

#[async_trait]
impl RdsClient for InMemoryRds {
    async fn describe_vpcs(&self, tag_filters: &[Tag]) -> CloudResult<Vec<Vpc>> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .vpcs
            .iter()
            .filter(|vpc| {
                tag_filters
                    .iter()
                    .all(|filter| has_tag(&vpc.tags, &filter.key, &filter.value))
            })
            .cloned()
            .collect())
    }

    async fn describe_db_security_groups(&self, vpc_id: &str) -> CloudResult<Vec<SecurityGroup>> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .security_groups
            .iter()
            .filter(|group| {
                group.vpc_id == vpc_id
                    && has_tag(
                        &group.tags,
                        DB_SECURITY_GROUP_TAG_KEY,
                        DB_SECURITY_GROUP_TAG_VALUE,
                    )
            })
            .cloned()
            .collect())
    }

    async fn describe_db_subnet_groups(&self) -> CloudResult<Vec<DbSubnetGroup>> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.subnet_groups.clone())
    }

    async fn create_db_cluster_snapshot(
        &self,
        db_cluster_id: &str,
        snapshot_id: &str,
        tags: &[Tag],
    ) -> CloudResult<DbClusterSnapshot> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state.calls.create_snapshot += 1;
        if state.snapshots.contains_key(snapshot_id) {
            return Err(CloudError::AlreadyExists(format!("snapshot {snapshot_id}")));
        }
        let snapshot = DbClusterSnapshot {
            id: snapshot_id.to_string(),
            arn: format!("arn:aws:rds:us-east-1:000000000000:cluster-snapshot:{snapshot_id}"),
            db_cluster_id: db_cluster_id.to_string(),
            snapshot_type: super::SNAPSHOT_TYPE_MANUAL.to_string(),
            status: self.initial_status(),
            created_at: state.next_created_at(),
        };
        state.tags.insert(snapshot.arn.clone(), tags.to_vec());
        state
            .snapshots
            .insert(snapshot.id.clone(), self.settling(snapshot.clone()));
        Ok(snapshot)
    }

    async fn describe_db_cluster_snapshots(
        &self,
        snapshot_type: &str,
    ) -> CloudResult<Vec<DbClusterSnapshot>> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let mut snapshots = Vec::new();
        for entry in state.snapshots.values_mut() {
            if entry.resource.snapshot_type != snapshot_type {
                continue;
            }
            poll(&mut entry.resource.status, &mut entry.polls_remaining);
            snapshots.push(entry.resource.clone());
        }
        Ok(snapshots)
    }

    async fn list_tags_for_resource(&self, arn: &str) -> CloudResult<Vec<Tag>> {
        let state = self.state.lock().await;
        state.check_available()?;
        state
            .tags
            .get(arn)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("resource {arn}")))
    }

    async fn restore_db_cluster_from_snapshot(
        &self,
        request: &RestoreDbClusterRequest,
    ) -> CloudResult<DbCluster> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state.calls.restore_cluster += 1;
        if state.clusters.contains_key(&request.db_cluster_id) {
            return Err(CloudError::AlreadyExists(format!(
                "DB cluster {}",
                request.db_cluster_id
            )));
        }
        match state.snapshots.get(&request.snapshot_id) {
            Some(entry) if entry.resource.status == ResourceStatus::Available => {}
            Some(entry) => {
                return Err(CloudError::InvalidState(format!(
                    "snapshot {} is {}",
                    request.snapshot_id, entry.resource.status
                )));
            }
            None => {
                return Err(CloudError::NotFound(format!(
                    "snapshot {}",
                    request.snapshot_id
                )));
            }
        }
        let cluster = DbCluster {
            id: request.db_cluster_id.clone(),
            status: self.initial_status(),
            snapshot_id: Some(request.snapshot_id.clone()),
            subnet_group_name: Some(request.subnet_group_name.clone()),
            members: Vec::new(),
            tags: request.tags.clone(),
        };
        state
            .clusters
            .insert(cluster.id.clone(), self.settling(cluster.clone()));
        Ok(cluster)
    }

    async fn describe_db_cluster(&self, db_cluster_id: &str) -> CloudResult<DbCluster> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let entry = state
            .clusters
            .get_mut(db_cluster_id)
            .ok_or_else(|| CloudError::NotFound(format!("DB cluster {db_cluster_id}")))?;
        poll(&mut entry.resource.status, &mut entry.polls_remaining);
        Ok(entry.resource.clone())
    }

    async fn describe_db_cluster_endpoints(
        &self,
        db_cluster_id: &str,
    ) -> CloudResult<Vec<DbClusterEndpoint>> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let entry = state
            .clusters
            .get_mut(db_cluster_id)
            .ok_or_else(|| CloudError::NotFound(format!("DB cluster {db_cluster_id}")))?;
        let status = poll(&mut entry.resource.status, &mut entry.polls_remaining);
        Ok(vec![
            DbClusterEndpoint {
                address: format!("{db_cluster_id}.cluster.us-east-1.rds.amazonaws.com"),
                endpoint_type: "WRITER".to_string(),
                status: status.clone(),
            },
            DbClusterEndpoint {
                address: format!("{db_cluster_id}.cluster-ro.us-east-1.rds.amazonaws.com"),
                endpoint_type: "READER".to_string(),
                status,
            },
        ])
    }

    async fn delete_db_cluster(&self, db_cluster_id: &str) -> CloudResult<()> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state.calls.delete_cluster += 1;
        state
            .clusters
            .remove(db_cluster_id)
            .map(|_| ())
            .ok_or_else(|| CloudError::NotFound(format!("DB cluster {db_cluster_id}")))
    }

    async fn create_db_instance(&self, request: &CreateDbInstanceRequest) -> CloudResult<DbInstance> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state.calls.create_instance += 1;
        if state.instances.contains_key(&request.instance_id) {
            return Err(CloudError::AlreadyExists(format!(
                "DB instance {}",
                request.instance_id
            )));
        }
        let status = self.initial_status();
        let cluster = state
            .clusters
            .get_mut(&request.db_cluster_id)
            .ok_or_else(|| CloudError::NotFound(format!("DB cluster {}", request.db_cluster_id)))?;
        cluster.resource.members.push(request.instance_id.clone());
        let instance = DbInstance {
            id: request.instance_id.clone(),
            db_cluster_id: request.db_cluster_id.clone(),
            status,
        };
        state
            .instances
            .insert(instance.id.clone(), self.settling(instance.clone()));
        Ok(instance)
    }

    async fn describe_db_instance(&self, instance_id: &str) -> CloudResult<DbInstance> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let entry = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| CloudError::NotFound(format!("DB instance {instance_id}")))?;
        poll(&mut entry.resource.status, &mut entry.polls_remaining);
        Ok(entry.resource.clone())
    }

    async fn delete_db_instance(&self, instance_id: &str) -> CloudResult<()> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state.calls.delete_instance += 1;
        let instance = state
            .instances
            .remove(instance_id)
            .ok_or_else(|| CloudError::NotFound(format!("DB instance {instance_id}")))?;
        if let Some(cluster) = state.clusters.get_mut(&instance.resource.db_cluster_id) {
            cluster.resource.members.retain(|member| member != instance_id);
        }
        Ok(())
    }
}
