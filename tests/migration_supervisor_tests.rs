use async_trait::async_trait;
use provisioner::cloud::{InMemoryRds, RdsClient, ResourceStatus};
use provisioner::core::{ProvisionerError, Result};
use provisioner::database::{
    CloudDatabaseMigrationFactory, DatabaseMigration, DatabaseMigrationError,
    DatabaseMigrationFactory, DatabaseMigrationStatus, MigrationResult,
};
use provisioner::model::{
    Cluster, ClusterInstallation, ClusterInstallationState, ClusterState, DatabaseBackendKind,
    Installation, InstallationState, Migration, MigrationState,
};
use provisioner::store::{
    ClusterInstallationFilter, ClusterInstallationStore, ClusterStore, InstallationStore,
    MemoryStore, MigrationStore, Store,
};
use provisioner::supervisor::{MigrationSupervisor, SuperviseOutcome, Supervisor};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

#[derive(Default)]
struct StubCalls {
    snapshot: AtomicUsize,
    snapshot_status: AtomicUsize,
    restore: AtomicUsize,
    database_status: AtomicUsize,
}

impl StubCalls {
    fn total(&self) -> usize {
        self.snapshot.load(Ordering::SeqCst)
            + self.snapshot_status.load(Ordering::SeqCst)
            + self.restore.load(Ordering::SeqCst)
            + self.database_status.load(Ordering::SeqCst)
    }
}

/// Capability that answers from canned results and can hold `snapshot` until
/// the test lets it through.
struct StubMigration {
    calls: StubCalls,
    status: Mutex<DatabaseMigrationStatus>,
    restore_error: Mutex<Option<DatabaseMigrationError>>,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl StubMigration {
    fn ready() -> Self {
        Self {
            calls: StubCalls::default(),
            status: Mutex::new(DatabaseMigrationStatus::Ready),
            restore_error: Mutex::new(None),
            gate: None,
        }
    }

    fn gated(entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            gate: Some((entered, release)),
            ..Self::ready()
        }
    }

    fn set_status(&self, status: DatabaseMigrationStatus) {
        *self.status.lock().unwrap() = status;
    }

    fn fail_restore(&self, err: DatabaseMigrationError) {
        *self.restore_error.lock().unwrap() = Some(err);
    }
}

#[async_trait]
impl DatabaseMigration for StubMigration {
    async fn snapshot(&self) -> MigrationResult<()> {
        self.calls.snapshot.fetch_add(1, Ordering::SeqCst);
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        Ok(())
    }

    async fn snapshot_status(&self) -> MigrationResult<DatabaseMigrationStatus> {
        self.calls.snapshot_status.fetch_add(1, Ordering::SeqCst);
        Ok(*self.status.lock().unwrap())
    }

    async fn restore(&self) -> MigrationResult<()> {
        self.calls.restore.fetch_add(1, Ordering::SeqCst);
        match self.restore_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn database_status(&self) -> MigrationResult<DatabaseMigrationStatus> {
        self.calls.database_status.fetch_add(1, Ordering::SeqCst);
        Ok(*self.status.lock().unwrap())
    }

    async fn teardown(&self) -> MigrationResult<()> {
        Ok(())
    }
}

struct StubFactory(Arc<StubMigration>);

impl DatabaseMigrationFactory for StubFactory {
    fn database_migration(
        &self,
        _installation: &Installation,
        _migration: &Migration,
    ) -> Arc<dyn DatabaseMigration> {
        self.0.clone()
    }
}

struct Fixture {
    store: Arc<dyn Store>,
    installation: Installation,
    source: ClusterInstallation,
    destination: Cluster,
    migration: Migration,
}

impl Fixture {
    async fn new(database: DatabaseBackendKind) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), database).await
    }

    async fn with_store(store: Arc<dyn Store>, database: DatabaseBackendKind) -> Self {
        let mut source_cluster = Cluster::new("aws", "SizeAlef500");
        source_cluster.state = ClusterState::Stable;
        let mut destination = Cluster::new("aws", "SizeAlef500");
        destination.state = ClusterState::Stable;
        store.create_cluster(&source_cluster).await.unwrap();
        store.create_cluster(&destination).await.unwrap();

        let mut installation = Installation::new("owner", "tenant.example.com", database);
        installation.state = InstallationState::Stable;
        store.create_installation(&installation).await.unwrap();

        let mut source = ClusterInstallation::new(&source_cluster.id, &installation.id);
        source.state = ClusterInstallationState::Stable;
        store.create_cluster_installation(&source).await.unwrap();

        let migration = Migration::new(&destination.id, &source.id);
        store.create_migration(&migration).await.unwrap();

        Self {
            store,
            installation,
            source,
            destination,
            migration,
        }
    }

    fn supervisor(
        &self,
        factory: Arc<dyn DatabaseMigrationFactory>,
        instance: &str,
    ) -> MigrationSupervisor {
        MigrationSupervisor::new(Arc::clone(&self.store), factory, instance)
    }

    async fn migration(&self) -> Migration {
        self.store
            .get_migration(&self.migration.id)
            .await
            .unwrap()
            .unwrap()
    }

    async fn set_state(&self, state: MigrationState) -> Migration {
        let mut migration = self.migration().await;
        migration.state = state;
        self.store.update_migration(&migration).await.unwrap();
        migration
    }

    async fn source(&self) -> ClusterInstallation {
        self.store
            .get_cluster_installation(&self.source.id)
            .await
            .unwrap()
            .unwrap()
    }

    async fn installation(&self) -> Installation {
        self.store
            .get_installation(&self.installation.id)
            .await
            .unwrap()
            .unwrap()
    }
}

fn position(state: MigrationState) -> usize {
    MigrationState::ALL
        .iter()
        .position(|candidate| *candidate == state)
        .unwrap()
}

#[tokio::test]
async fn ready_capability_reaches_stable_in_six_ticks() {
    let fixture = Fixture::new(DatabaseBackendKind::AwsRds).await;
    let stub = Arc::new(StubMigration::ready());
    let supervisor = fixture.supervisor(Arc::new(StubFactory(stub.clone())), "supervisor-1");

    let expected = [
        MigrationState::CreationComplete,
        MigrationState::SnapshotCreationInProgress,
        MigrationState::SnapshotCreationComplete,
        MigrationState::RestoreDatabaseInProgress,
        MigrationState::RestoreDatabaseComplete,
        MigrationState::Stable,
    ];
    let mut from = MigrationState::CreationRequested;
    for to in expected {
        let outcome = supervisor.supervise(&fixture.migration().await).await;
        assert_eq!(outcome, SuperviseOutcome::Transitioned { from, to });
        from = to;
    }

    let migration = fixture.migration().await;
    assert_eq!(migration.state, MigrationState::Stable);
    assert_eq!(migration.lock_acquired_by, None);

    // Collaborators stay claimed by the migration until it is deleted.
    let migration_id = Some(fixture.migration.id.clone());
    assert_eq!(fixture.source().await.lock_acquired_by, migration_id);
    assert_eq!(fixture.installation().await.lock_acquired_by, migration_id);

    let placements = fixture
        .store
        .get_cluster_installations(&ClusterInstallationFilter::for_cluster(
            &fixture.destination.id,
        ))
        .await
        .unwrap();
    assert_eq!(placements.len(), 1);
    assert_eq!(placements[0].installation_id, fixture.installation.id);
    assert_eq!(placements[0].state, ClusterInstallationState::CreationRequested);

    assert_eq!(stub.calls.snapshot.load(Ordering::SeqCst), 1);
    assert_eq!(stub.calls.restore.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsupported_backend_fails_without_claims() {
    let fixture = Fixture::new(DatabaseBackendKind::InClusterMysql).await;
    let stub = Arc::new(StubMigration::ready());
    let supervisor = fixture.supervisor(Arc::new(StubFactory(stub.clone())), "supervisor-1");

    let outcome = supervisor.supervise(&fixture.migration).await;
    assert_eq!(
        outcome,
        SuperviseOutcome::Transitioned {
            from: MigrationState::CreationRequested,
            to: MigrationState::CreationFailed,
        }
    );
    assert_eq!(fixture.source().await.lock_acquired_by, None);
    assert_eq!(fixture.installation().await.lock_acquired_by, None);
    assert_eq!(stub.calls.total(), 0);
}

#[tokio::test]
async fn missing_destination_cluster_fails_migration() {
    let fixture = Fixture::new(DatabaseBackendKind::AwsRds).await;
    fixture
        .store
        .delete_cluster(&fixture.destination.id)
        .await
        .unwrap();
    let supervisor = fixture.supervisor(
        Arc::new(StubFactory(Arc::new(StubMigration::ready()))),
        "supervisor-1",
    );

    supervisor.supervise(&fixture.migration).await;
    assert_eq!(fixture.migration().await.state, MigrationState::CreationFailed);
}

#[tokio::test]
async fn terminal_migrations_are_left_alone() {
    let fixture = Fixture::new(DatabaseBackendKind::AwsRds).await;
    let stub = Arc::new(StubMigration::ready());
    let supervisor = fixture.supervisor(Arc::new(StubFactory(stub.clone())), "supervisor-1");

    for state in [MigrationState::Stable, MigrationState::CreationFailed] {
        let migration = fixture.set_state(state).await;
        assert_eq!(
            supervisor.supervise(&migration).await,
            SuperviseOutcome::Unchanged(state)
        );
        assert_eq!(supervisor.transition(&migration).await, state);
        assert!(
            fixture
                .store
                .get_unlocked_migrations_pending_work()
                .await
                .unwrap()
                .is_empty()
        );
    }
    assert_eq!(stub.calls.total(), 0);
}

#[tokio::test]
async fn waiting_statuses_keep_the_current_state() {
    let fixture = Fixture::new(DatabaseBackendKind::AwsRds).await;
    let stub = Arc::new(StubMigration::ready());
    stub.set_status(DatabaseMigrationStatus::InProgress);
    let supervisor = fixture.supervisor(Arc::new(StubFactory(stub.clone())), "supervisor-1");

    for state in [
        MigrationState::SnapshotCreationInProgress,
        MigrationState::RestoreDatabaseInProgress,
    ] {
        let migration = fixture.set_state(state).await;
        assert_eq!(
            supervisor.supervise(&migration).await,
            SuperviseOutcome::Unchanged(state)
        );
    }

    stub.set_status(DatabaseMigrationStatus::Failing);
    let migration = fixture.migration().await;
    assert_eq!(
        supervisor.supervise(&migration).await,
        SuperviseOutcome::Transitioned {
            from: MigrationState::RestoreDatabaseInProgress,
            to: MigrationState::CreationFailed,
        }
    );
}

#[tokio::test]
async fn capability_errors_map_to_retry_or_failure() {
    let fixture = Fixture::new(DatabaseBackendKind::AwsRds).await;
    let stub = Arc::new(StubMigration::ready());
    let supervisor = fixture.supervisor(Arc::new(StubFactory(stub.clone())), "supervisor-1");
    let migration = fixture
        .set_state(MigrationState::SnapshotCreationComplete)
        .await;

    for retry in [
        DatabaseMigrationError::Pending("replica is being deleted".to_string()),
        DatabaseMigrationError::Unavailable("throttled".to_string()),
    ] {
        stub.fail_restore(retry);
        assert_eq!(
            supervisor.transition(&migration).await,
            MigrationState::SnapshotCreationComplete
        );
    }

    stub.fail_restore(DatabaseMigrationError::Terminal(
        "replica belongs to someone else".to_string(),
    ));
    assert_eq!(
        supervisor.transition(&migration).await,
        MigrationState::CreationFailed
    );
}

#[tokio::test]
async fn claimed_installation_blocks_progress_and_releases_placement() {
    let fixture = Fixture::new(DatabaseBackendKind::AwsRds).await;
    assert!(
        fixture
            .store
            .lock_installation(&fixture.installation.id, "operator")
            .await
            .unwrap()
    );
    let stub = Arc::new(StubMigration::ready());
    let supervisor = fixture.supervisor(Arc::new(StubFactory(stub.clone())), "supervisor-1");

    let outcome = supervisor.supervise(&fixture.migration).await;
    assert_eq!(
        outcome,
        SuperviseOutcome::Unchanged(MigrationState::CreationRequested)
    );
    assert_eq!(fixture.source().await.lock_acquired_by, None);
    assert_eq!(
        fixture.installation().await.lock_acquired_by.as_deref(),
        Some("operator")
    );

    fixture
        .store
        .unlock_installation(&fixture.installation.id, "operator", false)
        .await
        .unwrap();
    assert_eq!(
        supervisor.supervise(&fixture.migration).await,
        SuperviseOutcome::Transitioned {
            from: MigrationState::CreationRequested,
            to: MigrationState::CreationComplete,
        }
    );
}

#[tokio::test]
async fn claimed_placement_blocks_progress() {
    let fixture = Fixture::new(DatabaseBackendKind::AwsRds).await;
    fixture
        .store
        .lock_cluster_installation(&fixture.source.id, "other-migration")
        .await
        .unwrap();
    let supervisor = fixture.supervisor(
        Arc::new(StubFactory(Arc::new(StubMigration::ready()))),
        "supervisor-1",
    );

    assert_eq!(
        supervisor.supervise(&fixture.migration).await,
        SuperviseOutcome::Unchanged(MigrationState::CreationRequested)
    );
    assert_eq!(fixture.installation().await.lock_acquired_by, None);
}

#[tokio::test]
async fn concurrent_supervisors_never_share_a_migration() {
    let fixture = Fixture::new(DatabaseBackendKind::AwsRds).await;
    let migration = fixture.set_state(MigrationState::CreationComplete).await;

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let stub = Arc::new(StubMigration::gated(
        Arc::clone(&entered),
        Arc::clone(&release),
    ));
    let first = Arc::new(fixture.supervisor(Arc::new(StubFactory(stub.clone())), "supervisor-1"));
    let second = fixture.supervisor(Arc::new(StubFactory(stub.clone())), "supervisor-2");

    let running = {
        let first = Arc::clone(&first);
        let migration = migration.clone();
        tokio::spawn(async move { first.supervise(&migration).await })
    };
    entered.notified().await;

    assert_eq!(
        fixture.migration().await.lock_acquired_by.as_deref(),
        Some("supervisor-1")
    );
    assert_eq!(
        second.supervise(&migration).await,
        SuperviseOutcome::LockNotAcquired
    );

    release.notify_one();
    assert_eq!(
        running.await.unwrap(),
        SuperviseOutcome::Transitioned {
            from: MigrationState::CreationComplete,
            to: MigrationState::SnapshotCreationInProgress,
        }
    );
    assert_eq!(stub.calls.snapshot.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.migration().await.lock_acquired_by, None);
}

#[tokio::test]
async fn repeated_steps_do_not_duplicate_cloud_requests() {
    let fixture = Fixture::new(DatabaseBackendKind::AwsRds).await;
    let rds = InMemoryRds::new();
    rds.add_cluster_network(&fixture.destination.id).await;
    let factory = Arc::new(CloudDatabaseMigrationFactory::new(Arc::new(rds.clone())));
    let supervisor = fixture.supervisor(factory, "supervisor-1");

    let migration = fixture.set_state(MigrationState::CreationComplete).await;
    for _ in 0..3 {
        assert_eq!(
            supervisor.transition(&migration).await,
            MigrationState::SnapshotCreationInProgress
        );
    }
    assert_eq!(rds.calls().await.create_snapshot, 1);

    let migration = fixture
        .set_state(MigrationState::SnapshotCreationComplete)
        .await;
    for _ in 0..3 {
        assert_eq!(
            supervisor.transition(&migration).await,
            MigrationState::RestoreDatabaseInProgress
        );
    }
    let calls = rds.calls().await;
    assert_eq!(calls.restore_cluster, 1);
    assert_eq!(calls.create_instance, 1);
}

#[tokio::test]
async fn cloud_backed_migration_moves_forward_only() {
    let fixture = Fixture::new(DatabaseBackendKind::AwsRds).await;
    let rds = InMemoryRds::with_settle_polls(2);
    rds.add_cluster_network(&fixture.destination.id).await;
    let factory = Arc::new(CloudDatabaseMigrationFactory::new(Arc::new(rds.clone())));
    let supervisor = fixture.supervisor(factory, "supervisor-1");

    let mut last = MigrationState::CreationRequested;
    for _ in 0..30 {
        supervisor.supervise(&fixture.migration().await).await;
        let state = fixture.migration().await.state;
        assert!(position(state) >= position(last), "{last} went back to {state}");
        last = state;
        if state.is_terminal() {
            break;
        }
    }
    assert_eq!(last, MigrationState::Stable);
    assert_eq!(rds.calls().await.create_snapshot, 1);
    assert_eq!(rds.calls().await.restore_cluster, 1);
}

/// Supervises until the migration reaches `state`.
async fn supervise_until(
    fixture: &Fixture,
    supervisor: &MigrationSupervisor,
    state: MigrationState,
) {
    for _ in 0..10 {
        if fixture.migration().await.state == state {
            return;
        }
        supervisor.supervise(&fixture.migration().await).await;
    }
    assert_eq!(fixture.migration().await.state, state);
}

#[tokio::test]
async fn deleted_snapshot_fails_the_migration() {
    let fixture = Fixture::new(DatabaseBackendKind::AwsRds).await;
    let rds = InMemoryRds::with_settle_polls(1000);
    rds.add_cluster_network(&fixture.destination.id).await;
    let factory = Arc::new(CloudDatabaseMigrationFactory::new(Arc::new(rds.clone())));
    let supervisor = fixture.supervisor(factory, "supervisor-1");

    supervise_until(&fixture, &supervisor, MigrationState::SnapshotCreationInProgress).await;
    supervisor.supervise(&fixture.migration().await).await;
    assert_eq!(
        fixture.migration().await.state,
        MigrationState::SnapshotCreationInProgress
    );

    let snapshot_id = rds.snapshots().await[0].id.clone();
    rds.remove_snapshot(&snapshot_id).await;
    assert_eq!(
        supervisor.supervise(&fixture.migration().await).await,
        SuperviseOutcome::Transitioned {
            from: MigrationState::SnapshotCreationInProgress,
            to: MigrationState::CreationFailed,
        }
    );
}

#[tokio::test]
async fn replica_deleted_during_restore_fails_the_migration() {
    let fixture = Fixture::new(DatabaseBackendKind::AwsRds).await;
    let rds = InMemoryRds::with_settle_polls(1000);
    rds.add_cluster_network(&fixture.destination.id).await;
    let factory = Arc::new(CloudDatabaseMigrationFactory::new(Arc::new(rds.clone())));
    let supervisor = fixture.supervisor(factory, "supervisor-1");

    supervise_until(&fixture, &supervisor, MigrationState::SnapshotCreationInProgress).await;
    let snapshot_id = rds.snapshots().await[0].id.clone();
    rds.set_snapshot_status(&snapshot_id, ResourceStatus::Available)
        .await;
    supervise_until(&fixture, &supervisor, MigrationState::RestoreDatabaseInProgress).await;
    supervisor.supervise(&fixture.migration().await).await;
    assert_eq!(
        fixture.migration().await.state,
        MigrationState::RestoreDatabaseInProgress
    );

    let replica = format!("cloud-{}-migrated", fixture.installation.id);
    rds.delete_db_instance(&format!("{replica}-master"))
        .await
        .unwrap();
    rds.delete_db_cluster(&replica).await.unwrap();

    assert_eq!(
        supervisor.supervise(&fixture.migration().await).await,
        SuperviseOutcome::Transitioned {
            from: MigrationState::RestoreDatabaseInProgress,
            to: MigrationState::CreationFailed,
        }
    );
    assert_eq!(
        supervisor.supervise(&fixture.migration().await).await,
        SuperviseOutcome::Unchanged(MigrationState::CreationFailed)
    );
}

#[tokio::test]
async fn do_work_advances_every_pending_migration() {
    let first = Fixture::new(DatabaseBackendKind::AwsRds).await;
    let second = Fixture::with_store(Arc::clone(&first.store), DatabaseBackendKind::AwsRds).await;
    let supervisor = first
        .supervisor(
            Arc::new(StubFactory(Arc::new(StubMigration::ready()))),
            "supervisor-1",
        )
        .with_worker_limit(2);

    supervisor.do_work().await.unwrap();

    assert_eq!(first.migration().await.state, MigrationState::CreationComplete);
    assert_eq!(second.migration().await.state, MigrationState::CreationComplete);
}

/// Store whose migration listing always fails.
struct BrokenListing(MemoryStore);

#[async_trait]
impl ClusterStore for BrokenListing {
    async fn get_cluster(&self, id: &str) -> Result<Option<Cluster>> {
        self.0.get_cluster(id).await
    }
    async fn get_clusters(&self) -> Result<Vec<Cluster>> {
        self.0.get_clusters().await
    }
    async fn get_unlocked_clusters_pending_work(&self) -> Result<Vec<Cluster>> {
        self.0.get_unlocked_clusters_pending_work().await
    }
    async fn create_cluster(&self, cluster: &Cluster) -> Result<()> {
        self.0.create_cluster(cluster).await
    }
    async fn update_cluster(&self, cluster: &Cluster) -> Result<()> {
        self.0.update_cluster(cluster).await
    }
    async fn delete_cluster(&self, id: &str) -> Result<()> {
        self.0.delete_cluster(id).await
    }
    async fn lock_cluster(&self, id: &str, locker_id: &str) -> Result<bool> {
        self.0.lock_cluster(id, locker_id).await
    }
    async fn unlock_cluster(&self, id: &str, locker_id: &str, force: bool) -> Result<bool> {
        self.0.unlock_cluster(id, locker_id, force).await
    }
}

#[async_trait]
impl InstallationStore for BrokenListing {
    async fn get_installation(&self, id: &str) -> Result<Option<Installation>> {
        self.0.get_installation(id).await
    }
    async fn get_installations(&self) -> Result<Vec<Installation>> {
        self.0.get_installations().await
    }
    async fn get_unlocked_installations_pending_work(&self) -> Result<Vec<Installation>> {
        self.0.get_unlocked_installations_pending_work().await
    }
    async fn create_installation(&self, installation: &Installation) -> Result<()> {
        self.0.create_installation(installation).await
    }
    async fn update_installation(&self, installation: &Installation) -> Result<()> {
        self.0.update_installation(installation).await
    }
    async fn delete_installation(&self, id: &str) -> Result<()> {
        self.0.delete_installation(id).await
    }
    async fn lock_installation(&self, id: &str, locker_id: &str) -> Result<bool> {
        self.0.lock_installation(id, locker_id).await
    }
    async fn unlock_installation(&self, id: &str, locker_id: &str, force: bool) -> Result<bool> {
        self.0.unlock_installation(id, locker_id, force).await
    }
}

#[async_trait]
impl ClusterInstallationStore for BrokenListing {
    async fn get_cluster_installation(&self, id: &str) -> Result<Option<ClusterInstallation>> {
        self.0.get_cluster_installation(id).await
    }
    async fn get_cluster_installations(
        &self,
        filter: &ClusterInstallationFilter,
    ) -> Result<Vec<ClusterInstallation>> {
        self.0.get_cluster_installations(filter).await
    }
    async fn get_unlocked_cluster_installations_pending_work(
        &self,
    ) -> Result<Vec<ClusterInstallation>> {
        self.0.get_unlocked_cluster_installations_pending_work().await
    }
    async fn create_cluster_installation(&self, ci: &ClusterInstallation) -> Result<()> {
        self.0.create_cluster_installation(ci).await
    }
    async fn update_cluster_installation(&self, ci: &ClusterInstallation) -> Result<()> {
        self.0.update_cluster_installation(ci).await
    }
    async fn delete_cluster_installation(&self, id: &str) -> Result<()> {
        self.0.delete_cluster_installation(id).await
    }
    async fn lock_cluster_installation(&self, id: &str, locker_id: &str) -> Result<bool> {
        self.0.lock_cluster_installation(id, locker_id).await
    }
    async fn unlock_cluster_installation(
        &self,
        id: &str,
        locker_id: &str,
        force: bool,
    ) -> Result<bool> {
        self.0.unlock_cluster_installation(id, locker_id, force).await
    }
}

#[async_trait]
impl MigrationStore for BrokenListing {
    async fn get_migration(&self, id: &str) -> Result<Option<Migration>> {
        self.0.get_migration(id).await
    }
    async fn get_migrations(&self) -> Result<Vec<Migration>> {
        self.0.get_migrations().await
    }
    async fn get_unlocked_migrations_pending_work(&self) -> Result<Vec<Migration>> {
        Err(ProvisionerError::Store("listing unavailable".to_string()))
    }
    async fn create_migration(&self, migration: &Migration) -> Result<()> {
        self.0.create_migration(migration).await
    }
    async fn update_migration(&self, migration: &Migration) -> Result<()> {
        self.0.update_migration(migration).await
    }
    async fn delete_migration(&self, id: &str) -> Result<()> {
        self.0.delete_migration(id).await
    }
    async fn lock_migration(&self, id: &str, locker_id: &str) -> Result<bool> {
        self.0.lock_migration(id, locker_id).await
    }
    async fn unlock_migration(&self, id: &str, locker_id: &str, force: bool) -> Result<bool> {
        self.0.unlock_migration(id, locker_id, force).await
    }
}

#[tokio::test]
async fn do_work_survives_listing_failure() {
    let store: Arc<dyn Store> = Arc::new(BrokenListing(MemoryStore::new()));
    let fixture = Fixture::with_store(store, DatabaseBackendKind::AwsRds).await;
    let supervisor = fixture.supervisor(
        Arc::new(StubFactory(Arc::new(StubMigration::ready()))),
        "supervisor-1",
    );

    supervisor.do_work().await.unwrap();
    assert_eq!(
        fixture.migration().await.state,
        MigrationState::CreationRequested
    );
}
