//! Request payloads accepted by the HTTP API and sent by the client.

use super::DatabaseBackendKind;
use crate::core::{ProvisionerError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateClusterRequest {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_cluster_size")]
    pub size: String,
}

fn default_provider() -> String {
    "aws".to_string()
}

fn default_cluster_size() -> String {
    "SizeAlef500".to_string()
}

impl Default for CreateClusterRequest {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            size: default_cluster_size(),
        }
    }
}

impl CreateClusterRequest {
    pub fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            return Err(ProvisionerError::InvalidInput(
                "provider must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInstallationRequest {
    pub owner_id: String,
    pub dns: String,
    pub database: DatabaseBackendKind,
    #[serde(default)]
    pub size: Option<String>,
}

impl CreateInstallationRequest {
    pub fn validate(&self) -> Result<()> {
        if self.owner_id.trim().is_empty() {
            return Err(ProvisionerError::InvalidInput(
                "owner_id must not be empty".to_string(),
            ));
        }
        if self.dns.trim().is_empty() {
            return Err(ProvisionerError::InvalidInput(
                "dns must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Request to move an installation's placement to another cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMigrationRequest {
    /// Destination cluster.
    pub cluster_id: String,
    pub installation_id: String,
    /// Source placement; resolved from the installation when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_installation_id: Option<String>,
}

impl CreateMigrationRequest {
    pub fn validate(&self) -> Result<()> {
        if self.cluster_id.trim().is_empty() {
            return Err(ProvisionerError::InvalidInput(
                "cluster_id must not be empty".to_string(),
            ));
        }
        if self.installation_id.trim().is_empty() {
            return Err(ProvisionerError::InvalidInput(
                "installation_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Operator release of a migration claim. Without `force` the claim is only
/// released when `locker_id` names its current owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locker_id: Option<String>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockResponse {
    pub unlocked: bool,
}
