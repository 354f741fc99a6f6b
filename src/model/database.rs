use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Database backend an installation runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatabaseBackendKind {
    /// MySQL operated inside the workload cluster.
    InClusterMysql,
    /// A dedicated AWS RDS (Aurora MySQL) cluster.
    AwsRds,
}

impl DatabaseBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseBackendKind::InClusterMysql => "in-cluster-mysql",
            DatabaseBackendKind::AwsRds => "aws-rds",
        }
    }

    /// Only backends with a snapshot/restore capability can be migrated.
    pub fn is_migratable(&self) -> bool {
        matches!(self, DatabaseBackendKind::AwsRds)
    }
}

impl fmt::Display for DatabaseBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "in-cluster-mysql" => Ok(DatabaseBackendKind::InClusterMysql),
            "aws-rds" => Ok(DatabaseBackendKind::AwsRds),
            other => Err(format!("unknown database backend '{other}'")),
        }
    }
}
