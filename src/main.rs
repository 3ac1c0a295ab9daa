// src/main.rs

//! Process entry point: loads configuration, brings up the database pool,
//! the group cache, the key pool, dynamic weighting, the task tracker, and
//! the background workers (group syncer, log retention sweep, metrics
//! server), then idles until shutdown is requested.

use anyhow::{Context, Result};
use keygate::config::{Config, Dialect};
use keygate::core::bulk::sqlite_tuning;
use keygate::core::crypto::AesGcmCryptoBox;
use keygate::core::db::pool;
use keygate::core::group::GroupManager;
use keygate::core::keypool::KeyProvider;
use keygate::core::logcleanup;
use keygate::core::task::TaskService;
use keygate::core::weight::DynamicWeightManager;
use keygate::server::run_metrics_server;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    let config = Config::from_env().context("loading configuration")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting keygate");

    let db_pool = pool::connect(&config).await.context("connecting to database")?;
    if config.dialect == Dialect::Sqlite {
        sqlite_tuning::apply_safe_session_tuning(&db_pool, &config.sqlite_tuning)
            .await
            .context("applying sqlite session tuning")?;
    }

    let crypto = Arc::new(AesGcmCryptoBox::new(&config.encryption_key));

    let group_manager = GroupManager::new(db_pool.clone(), config.db_lookup_timeout)
        .await
        .context("loading initial group cache")?;
    group_manager.spawn_syncer();

    let key_provider = KeyProvider::new(db_pool.clone(), config.dialect, crypto.clone());
    let weight_manager = DynamicWeightManager::new(db_pool.clone(), config.dialect);
    let task_service = TaskService::new();

    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let system_settings = keygate::core::settings::load(&db_pool, config.dialect)
        .await
        .context("loading system settings")?;
    logcleanup::spawn(
        db_pool.clone(),
        config.dialect,
        system_settings.request_log_retention_days,
        shutdown_tx.subscribe(),
    );

    let metrics_port = config.metrics_port;
    let metrics_shutdown = shutdown_tx.subscribe();
    let metrics_handle = tokio::spawn(run_metrics_server(metrics_port, metrics_shutdown));

    // weight_manager and task_service are held here only to keep them alive
    // for the lifetime of the process; request-path wiring (key selection,
    // model-redirect weighting, task tracking for imports/deletes) lives in
    // the key/import/topology services that borrow them.
    let _ = &weight_manager;
    let _ = &task_service;

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown signal received, stopping background workers");

    group_manager.stop();
    key_provider.stop();
    let _ = shutdown_tx.send(());
    let _ = metrics_handle.await;

    Ok(())
}
