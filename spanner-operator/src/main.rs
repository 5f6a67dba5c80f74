//! spanner-operator: keeps Cloud Spanner instances and databases in line with
//! `SpannerInstance` and `SpannerDatabase` objects.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::{Api, Client};
use spanner_admin::mock::DEFAULT_DATA_DIR;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spanner_operator::config::{self, Backend, OperatorConfig};
use spanner_operator::recorder::{EventRecorder, KubeRecorder, TracingRecorder};
use spanner_operator::resource::{self, SpannerDatabase, SpannerInstance};
use spanner_operator::store::{DesiredStateCache, KubeCache, KubeWriter};
use spanner_operator::watch::{resync, wait_for_cache_sync, watch_resources};
use spanner_operator::{Controller, DatabaseReconciler, InstanceReconciler, WorkQueue};

/// Cloud Spanner operator
#[derive(Parser, Debug)]
#[command(name = "spanner-operator", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// GCP project id (discovered from the metadata server if unset)
    #[arg(long, env = "GCP_PROJECT_ID")]
    project_id: Option<String>,

    /// File holding an OAuth2 access token, raw or as `{"access_token": ...}`.
    /// Service account key files are not exchanged for tokens; without this
    /// flag tokens come from the GCE metadata server.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Use the file-backed mock instead of the Spanner API
    #[arg(long, env = "MOCK_ENABLED")]
    use_mock: bool,

    /// Data directory of the mock
    #[arg(long, env = "MOCK_DATA_PATH", default_value = DEFAULT_DATA_DIR)]
    mock_data_path: PathBuf,

    /// Seconds between re-enqueues of every known object (0 disables)
    #[arg(long, default_value = "30")]
    resync: u64,

    /// Workers per controller
    #[arg(long, default_value = "2")]
    workers: usize,

    /// Seconds to wait for the initial list of each resource kind
    #[arg(long, default_value = "60")]
    cache_sync_timeout: u64,

    /// Seconds a long-running Spanner operation may take
    #[arg(long, default_value = "1800")]
    operation_timeout: u64,

    /// Seconds a single Spanner API request may take
    #[arg(long, default_value = "30")]
    request_timeout: u64,

    /// Debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the CustomResourceDefinitions as YAML
    Crd,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.debug {
        "spanner_operator=debug,spanner_admin=debug,kube=info"
    } else {
        "spanner_operator=info,spanner_admin=info,kube=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(Command::Crd) = args.command {
        print!("{}", resource::crds_yaml().context("Failed to render CRDs")?);
        return Ok(());
    }

    let project_id = config::resolve_project_id(args.project_id)
        .await
        .context("Failed to determine project id")?;

    let config = OperatorConfig {
        project_id,
        credentials_path: args.credentials,
        backend: if args.use_mock {
            Backend::Mock {
                data_dir: args.mock_data_path,
            }
        } else {
            Backend::Live
        },
        workers: args.workers,
        resync_period: Duration::from_secs(args.resync),
        cache_sync_timeout: Duration::from_secs(args.cache_sync_timeout),
        request_timeout: Duration::from_secs(args.request_timeout),
        operation_timeout: Duration::from_secs(args.operation_timeout),
    };

    info!("Starting spanner-operator for project {}", config.project_id);
    info!("Backend: {:?}", config.backend);

    let admin = config::build_admin(&config)
        .await
        .context("Failed to create Spanner admin client")?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let recorder: Arc<dyn EventRecorder> = match config.backend {
        Backend::Mock { .. } => Arc::new(TracingRecorder),
        Backend::Live => Arc::new(KubeRecorder::new(client.clone(), "spanner-operator")),
    };
    let writer = Arc::new(KubeWriter::new(client.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let instance_queue = WorkQueue::new("SpannerInstances");
    let database_queue = WorkQueue::new("SpannerDatabases");

    let (instance_store, instance_watch) = watch_resources(
        Api::<SpannerInstance>::all(client.clone()),
        instance_queue.clone(),
        shutdown_rx.clone(),
    );
    let (database_store, database_watch) = watch_resources(
        Api::<SpannerDatabase>::all(client.clone()),
        database_queue.clone(),
        shutdown_rx.clone(),
    );

    info!("Waiting for caches to sync");
    wait_for_cache_sync(&instance_store, config.cache_sync_timeout)
        .await
        .context("SpannerInstance cache")?;
    wait_for_cache_sync(&database_store, config.cache_sync_timeout)
        .await
        .context("SpannerDatabase cache")?;

    let instance_cache: Arc<dyn DesiredStateCache<SpannerInstance>> =
        Arc::new(KubeCache::new(instance_store));
    let database_cache: Arc<dyn DesiredStateCache<SpannerDatabase>> =
        Arc::new(KubeCache::new(database_store));

    let resyncs = [
        resync(
            Arc::clone(&instance_cache),
            instance_queue.clone(),
            config.resync_period,
            shutdown_rx.clone(),
        ),
        resync(
            Arc::clone(&database_cache),
            database_queue.clone(),
            config.resync_period,
            shutdown_rx.clone(),
        ),
    ];

    let instances = Controller::new(
        Arc::new(InstanceReconciler::new(
            Arc::clone(&admin),
            instance_cache,
            writer.clone(),
            Arc::clone(&recorder),
        )),
        instance_queue,
        config.workers,
    );
    let databases = Controller::new(
        Arc::new(DatabaseReconciler::new(
            Arc::clone(&admin),
            database_cache,
            writer,
            Arc::clone(&recorder),
        )),
        database_queue,
        config.workers,
    );

    let mut tasks = vec![
        tokio::spawn(instances.run(shutdown_rx.clone())),
        tokio::spawn(databases.run(shutdown_rx)),
        instance_watch,
        database_watch,
    ];
    tasks.extend(resyncs);

    // Set up signal handlers
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to set up SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to set up SIGTERM handler")?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            error!("Task failed: {}", e);
        }
    }

    info!("Operator stopped");
    Ok(())
}
