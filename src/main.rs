use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use provisioner::model::{
    CreateClusterRequest, CreateInstallationRequest, CreateMigrationRequest, DatabaseBackendKind,
    UnlockRequest,
};
use provisioner::{ProvisionerClient, ProvisionerConfig, service};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "provisioner")]
#[command(about = "Control plane for clusters, installations and their migrations")]
struct Cli {
    /// Provisioning server the client commands talk to
    #[arg(long, global = true, default_value = "http://localhost:8075")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the provisioning server and its supervisors
    Server(ServerArgs),
    Cluster {
        #[command(subcommand)]
        command: ClusterCommand,
    },
    Installation {
        #[command(subcommand)]
        command: InstallationCommand,
    },
    Migration {
        #[command(subcommand)]
        command: MigrationCommand,
    },
}

#[derive(Args)]
struct ServerArgs {
    #[arg(long, default_value = "127.0.0.1:8075")]
    listen: SocketAddr,
    /// Persist the store under this directory
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Seconds between supervisor ticks
    #[arg(long, default_value_t = 30)]
    poll_interval: u64,
    #[arg(long, default_value_t = 4)]
    worker_limit: usize,
    /// Owner id for entity claims; generated when omitted
    #[arg(long)]
    instance_id: Option<String>,
    #[arg(long, default_value_t = 80)]
    cluster_resource_threshold: usize,
    /// Keep replica databases of failed migrations on delete
    #[arg(long)]
    keep_database_data: bool,
    #[arg(long, default_value_t = 2)]
    rds_settle_polls: u32,
}

#[derive(Subcommand)]
enum ClusterCommand {
    Create {
        #[arg(long, default_value = "aws")]
        provider: String,
        #[arg(long, default_value = "SizeAlef500")]
        size: String,
    },
    List,
}

#[derive(Subcommand)]
enum InstallationCommand {
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        dns: String,
        /// in-cluster-mysql or aws-rds
        #[arg(long, default_value = "aws-rds")]
        database: DatabaseBackendKind,
        #[arg(long)]
        size: Option<String>,
    },
    List,
    /// List the placements of an installation
    Placements {
        #[arg(long)]
        installation: String,
    },
}

#[derive(Subcommand)]
enum MigrationCommand {
    Create {
        /// Destination cluster
        #[arg(long)]
        cluster: String,
        #[arg(long)]
        installation: String,
        /// Source placement, when the installation has more than one
        #[arg(long)]
        cluster_installation: Option<String>,
    },
    List,
    Get {
        #[arg(long)]
        migration: String,
    },
    Delete {
        #[arg(long)]
        migration: String,
    },
    /// Release the migration's claim
    Unlock {
        #[arg(long)]
        migration: String,
        #[arg(long)]
        locker: Option<String>,
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Server(args) => run_server(args).await,
        Command::Cluster { command } => cluster(&connect(&cli.server)?, command).await,
        Command::Installation { command } => {
            installation(&connect(&cli.server)?, command).await
        }
        Command::Migration { command } => migration(&connect(&cli.server)?, command).await,
    }
}

fn connect(server: &str) -> Result<ProvisionerClient> {
    ProvisionerClient::new(server).with_context(|| format!("failed to build client for {server}"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("provisioner=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_server(args: ServerArgs) -> Result<()> {
    let mut config = ProvisionerConfig::new()
        .listen(args.listen)
        .poll_interval(Duration::from_secs(args.poll_interval))
        .worker_limit(args.worker_limit)
        .cluster_resource_threshold(args.cluster_resource_threshold)
        .keep_database_data(args.keep_database_data)
        .rds_settle_polls(args.rds_settle_polls);
    if let Some(dir) = args.data_dir {
        config = config.data_dir(dir);
    }
    if let Some(instance_id) = args.instance_id {
        config = config.instance_id(instance_id);
    }

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    service::run(config, shutdown)
        .await
        .context("provisioning server failed")
}

async fn cluster(client: &ProvisionerClient, command: ClusterCommand) -> Result<()> {
    match command {
        ClusterCommand::Create { provider, size } => print(
            &client
                .create_cluster(&CreateClusterRequest { provider, size })
                .await
                .context("failed to create cluster")?,
        ),
        ClusterCommand::List => print(&client.get_clusters().await?),
    }
}

async fn installation(client: &ProvisionerClient, command: InstallationCommand) -> Result<()> {
    match command {
        InstallationCommand::Create {
            owner,
            dns,
            database,
            size,
        } => print(
            &client
                .create_installation(&CreateInstallationRequest {
                    owner_id: owner,
                    dns,
                    database,
                    size,
                })
                .await
                .context("failed to create installation")?,
        ),
        InstallationCommand::List => print(&client.get_installations().await?),
        InstallationCommand::Placements { installation } => {
            print(&client.get_cluster_installations(&installation).await?)
        }
    }
}

async fn migration(client: &ProvisionerClient, command: MigrationCommand) -> Result<()> {
    match command {
        MigrationCommand::Create {
            cluster,
            installation,
            cluster_installation,
        } => print(
            &client
                .create_migration(&CreateMigrationRequest {
                    cluster_id: cluster,
                    installation_id: installation,
                    cluster_installation_id: cluster_installation,
                })
                .await
                .context("failed to create migration")?,
        ),
        MigrationCommand::List => print(&client.get_migrations().await?),
        MigrationCommand::Get { migration } => {
            print(&client.get_migration(&migration).await?)
        }
        MigrationCommand::Delete { migration } => {
            client
                .delete_migration(&migration)
                .await
                .with_context(|| format!("failed to delete migration {migration}"))?;
            println!("deleted migration {migration}");
            Ok(())
        }
        MigrationCommand::Unlock {
            migration,
            locker,
            force,
        } => {
            let unlocked = client
                .unlock_migration(
                    &migration,
                    &UnlockRequest {
                        locker_id: locker,
                        force,
                    },
                )
                .await?;
            println!("unlocked: {unlocked}");
            Ok(())
        }
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
