//! Durable snapshot file backing a [`super::MemoryStore`].

use super::table::Table;
use crate::core::{ProvisionerError, Result, now_millis};
use crate::model::{Cluster, ClusterInstallation, Installation, Migration};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub(crate) const STORE_SNAPSHOT_FILE: &str = "provisioner.snapshot";
const STORE_SNAPSHOT_VERSION: u32 = 1;

/// Every table of the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreTables {
    pub(crate) clusters: Table<Cluster>,
    pub(crate) installations: Table<Installation>,
    pub(crate) cluster_installations: Table<ClusterInstallation>,
    pub(crate) migrations: Table<Migration>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreSnapshot {
    version: u32,
    created_at: i64,
    tables: StoreTables,
}

pub(crate) struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub(crate) fn in_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            path: data_dir.as_ref().join(STORE_SNAPSHOT_FILE),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the tables to a temp file next to the target and renames it
    /// into place, so readers only ever see a complete snapshot.
    pub(crate) fn save(&self, tables: &StoreTables) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| ProvisionerError::IoError("snapshot path has no parent".to_string()))?;
        fs::create_dir_all(parent)?;

        let snapshot = StoreSnapshot {
            version: STORE_SNAPSHOT_VERSION,
            created_at: now_millis(),
            tables: tables.clone(),
        };
        let serialized = rmp_serde::to_vec_named(&snapshot)?;

        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            writer.write_all(&serialized)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|err| ProvisionerError::IoError(format!("failed to persist snapshot: {err}")))?;
        Ok(())
    }

    pub(crate) fn load(&self) -> Result<Option<StoreTables>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&data)?;
        if snapshot.version != STORE_SNAPSHOT_VERSION {
            return Err(ProvisionerError::Serialization(format!(
                "unsupported store snapshot version {}",
                snapshot.version
            )));
        }
        Ok(Some(snapshot.tables))
    }
}
