// ============================================================================
// Provisioner Library
// ============================================================================

pub mod api;
pub mod client;
pub mod cloud;
pub mod config;
pub mod core;
pub mod database;
pub mod model;
pub mod provisioning;
pub mod service;
pub mod store;
pub mod supervisor;

// Re-export main types for convenience
pub use client::ProvisionerClient;
pub use config::ProvisionerConfig;
pub use core::{ProvisionerError, Result};
pub use model::{
    Cluster, ClusterInstallation, DatabaseBackendKind, Installation, Migration, MigrationState,
};
pub use store::{EntityLock, LockTarget, MemoryStore, Store};
pub use supervisor::{MigrationSupervisor, Scheduler, SchedulerHandle, SuperviseOutcome, Supervisor};
