//! Wiring of a provisioning server: store, cloud seam, supervisors,
//! scheduler and HTTP API.

use crate::api::{self, AppState};
use crate::cloud::InMemoryRds;
use crate::config::ProvisionerConfig;
use crate::core::Result;
use crate::database::{CloudDatabaseMigrationFactory, DatabaseMigrationFactory};
use crate::provisioning::SimulatedProvisioner;
use crate::store::{MemoryStore, Store};
use crate::supervisor::{
    ClusterInstallationSupervisor, ClusterSupervisor, InstallationSupervisor,
    MigrationSupervisor, Scheduler, SchedulerHandle, Supervisor,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{Level, event};

/// Opens the entity store described by `config`.
pub fn open_store(config: &ProvisionerConfig) -> Result<Arc<dyn Store>> {
    Ok(match &config.data_dir {
        Some(dir) => Arc::new(MemoryStore::open(dir)?),
        None => Arc::new(MemoryStore::new()),
    })
}

/// Every supervisor of one server, in tick order.
pub fn supervisors(
    config: &ProvisionerConfig,
    store: Arc<dyn Store>,
    provisioner: Arc<SimulatedProvisioner>,
    factory: Arc<dyn DatabaseMigrationFactory>,
) -> Vec<Arc<dyn Supervisor>> {
    vec![
        Arc::new(ClusterSupervisor::new(
            Arc::clone(&store),
            provisioner.clone(),
            &config.instance_id,
        )),
        Arc::new(InstallationSupervisor::new(
            Arc::clone(&store),
            &config.instance_id,
            config.cluster_resource_threshold,
        )),
        Arc::new(ClusterInstallationSupervisor::new(
            Arc::clone(&store),
            provisioner,
            &config.instance_id,
        )),
        Arc::new(
            MigrationSupervisor::new(store, factory, &config.instance_id)
                .with_worker_limit(config.worker_limit),
        ),
    ]
}

/// Runs the server until `shutdown` resolves.
///
/// Cloud and cluster work runs against the in-process emulators.
pub async fn run<F>(config: ProvisionerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;

    let store = open_store(&config)?;
    let rds = InMemoryRds::with_settle_polls(config.rds_settle_polls);
    let provisioner = Arc::new(SimulatedProvisioner::with_network(rds.clone()));
    let factory: Arc<dyn DatabaseMigrationFactory> =
        Arc::new(CloudDatabaseMigrationFactory::new(Arc::new(rds)));

    let handle = SchedulerHandle::new();
    let scheduler = Scheduler::start(
        supervisors(&config, Arc::clone(&store), provisioner, Arc::clone(&factory)),
        config.poll_interval,
        handle.clone(),
    );

    let state = AppState::new(store, factory, handle)
        .keep_database_data(config.keep_database_data);
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    event!(
        Level::INFO,
        listen = %config.listen,
        instance = %config.instance_id,
        durable = config.data_dir.is_some(),
        "provisioning server listening"
    );
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    scheduler.stop().await?;
    event!(Level::INFO, "provisioning server stopped");
    Ok(())
}
