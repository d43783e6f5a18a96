//! extdb-controller: reconciles DatabaseUser and Database objects with a
//! PostgreSQL server.
//!
//! This daemon:
//! - Loads desired state from a JSON manifest and re-reads it periodically
//! - Watches the desired-state store for changes
//! - Creates and drops roles and databases through idempotent operations
//! - Holds a finalizer on every object until its role or database is gone

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use extdb_controller::config::{DatabaseConfig, ManifestConfig, RuntimeConfig};
use extdb_controller::controller::Controller;
use extdb_controller::driver::{PgConnector, PgPoolConnector, ResourceDriver, SqlDriver};
use extdb_controller::manifest::{self, Manifest};
use extdb_controller::reconciler::{DatabaseReconciler, DatabaseUserReconciler};
use extdb_controller::resource::{Database, DatabaseUser};
use extdb_controller::store::InMemoryStore;

/// extdb controller
#[derive(Parser, Debug)]
#[command(name = "extdb-controller", version, about)]
struct Args {
    #[command(flatten)]
    db: DatabaseConfig,

    #[command(flatten)]
    runtime: RuntimeConfig,

    #[command(flatten)]
    manifest: ManifestConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "extdb_controller=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting extdb-controller");
    info!(
        "Database server: {}:{} (database {}, user {})",
        args.db.host, args.db.port, args.db.dbname, args.db.user
    );

    let options = args.db.connect_options();
    if args.runtime.pool_size > 0 {
        info!("Using a pool of {} connections", args.runtime.pool_size);
        let driver = Arc::new(SqlDriver::new(PgPoolConnector::new(
            options,
            args.runtime.pool_size,
        )));
        let result = run(&args, Arc::clone(&driver)).await;
        driver.connector().close().await;
        result
    } else {
        run(&args, Arc::new(SqlDriver::new(PgConnector::new(options)))).await
    }
}

async fn run<D: ResourceDriver + 'static>(args: &Args, driver: Arc<D>) -> Result<()> {
    let users = Arc::new(InMemoryStore::<DatabaseUser>::new());
    let databases = Arc::new(InMemoryStore::<Database>::new());

    // The first load must succeed; later reloads keep the last good state.
    apply_manifest(&args.manifest.manifest, &users, &databases).await?;

    let config = args.runtime.controller_config();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let user_controller = Controller::new(
        Arc::new(DatabaseUserReconciler::new(Arc::clone(&driver))),
        Arc::clone(&users),
        config.clone(),
    );
    let database_controller = Controller::new(
        Arc::new(DatabaseReconciler::new(driver)),
        Arc::clone(&databases),
        config,
    );

    let user_task = tokio::spawn(user_controller.run(shutdown_rx.clone()));
    let database_task = tokio::spawn(database_controller.run(shutdown_rx.clone()));
    let manifest_task = tokio::spawn(manifest_loop(
        args.manifest.manifest.clone(),
        Duration::from_secs(args.manifest.manifest_interval_secs.max(1)),
        users,
        databases,
        shutdown_rx,
    ));

    shutdown_signal().await?;
    let _ = shutdown_tx.send(true);

    user_task.await.context("DatabaseUser controller panicked")??;
    database_task.await.context("Database controller panicked")??;
    manifest_task.await.context("Manifest task panicked")?;

    info!("Shutdown complete");
    Ok(())
}

async fn apply_manifest(
    path: &Path,
    users: &InMemoryStore<DatabaseUser>,
    databases: &InMemoryStore<Database>,
) -> Result<()> {
    let manifest = Manifest::load(path).await?;
    manifest::sync(users, &manifest.database_users).await?;
    manifest::sync(databases, &manifest.databases).await?;
    Ok(())
}

async fn manifest_loop(
    path: PathBuf,
    period: Duration,
    users: Arc<InMemoryStore<DatabaseUser>>,
    databases: Arc<InMemoryStore<Database>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = apply_manifest(&path, &users, &databases).await {
                    warn!("Failed to reload manifest {}: {:#}", path.display(), e);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn shutdown_signal() -> Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for SIGINT: {}", e);
            }
            info!("Received SIGINT");
        }
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
    Ok(())
}
