use crate::core::{ProvisionerError, Result, new_id};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Provisioning server configuration
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Address the HTTP API listens on
    pub listen: SocketAddr,

    /// Directory holding the durable store snapshot; `None` keeps state in memory only
    pub data_dir: Option<PathBuf>,

    /// Time between supervisor ticks
    pub poll_interval: Duration,

    /// Migrations supervised concurrently per tick
    pub worker_limit: usize,

    /// Owner id this process claims entities with
    pub instance_id: String,

    /// Maximum live placements per cluster when placing installations
    pub cluster_resource_threshold: usize,

    /// Keep the replica database when deleting a failed migration
    pub keep_database_data: bool,

    /// Polls before emulated cloud resources become available
    pub rds_settle_polls: u32,
}

impl ProvisionerConfig {
    pub fn new() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8075)),
            data_dir: None,
            poll_interval: Duration::from_secs(30),
            worker_limit: 4,
            instance_id: new_id(),
            cluster_resource_threshold: 80,
            keep_database_data: false,
            rds_settle_polls: 2,
        }
    }

    pub fn listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn worker_limit(mut self, limit: usize) -> Self {
        self.worker_limit = limit;
        self
    }

    pub fn instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    pub fn cluster_resource_threshold(mut self, threshold: usize) -> Self {
        self.cluster_resource_threshold = threshold;
        self
    }

    pub fn keep_database_data(mut self, keep: bool) -> Self {
        self.keep_database_data = keep;
        self
    }

    pub fn rds_settle_polls(mut self, polls: u32) -> Self {
        self.rds_settle_polls = polls;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(ProvisionerError::InvalidInput(
                "poll_interval must be > 0".to_string(),
            ));
        }

        if self.worker_limit == 0 {
            return Err(ProvisionerError::InvalidInput(
                "worker_limit must be > 0".to_string(),
            ));
        }

        if self.instance_id.trim().is_empty() {
            return Err(ProvisionerError::InvalidInput(
                "instance_id cannot be empty".to_string(),
            ));
        }

        if self.cluster_resource_threshold == 0 {
            return Err(ProvisionerError::InvalidInput(
                "cluster_resource_threshold must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProvisionerConfig::default();
        assert_eq!(config.listen.port(), 8075);
        assert!(config.data_dir.is_none());
        assert!(!config.instance_id.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ProvisionerConfig::new()
            .data_dir("/var/lib/provisioner")
            .poll_interval(Duration::from_secs(5))
            .worker_limit(8)
            .instance_id("node-a")
            .keep_database_data(true);

        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/provisioner")));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.worker_limit, 8);
        assert_eq!(config.instance_id, "node-a");
        assert!(config.keep_database_data);
    }

    #[test]
    fn test_invalid_config() {
        assert!(ProvisionerConfig::new().worker_limit(0).validate().is_err());
        assert!(ProvisionerConfig::new().instance_id(" ").validate().is_err());
        assert!(
            ProvisionerConfig::new()
                .poll_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
