//! # greenhubd — greenhub daemon
//!
//! Composition root that wires all adapters together and runs the telemetry
//! pipeline.
//!
//! ## Responsibilities
//! - Load configuration (`greenhub.toml`, `GREENHUB_*` env vars)
//! - Initialize logging, the `SQLite` pool and its migrations
//! - Construct repository implementations (adapters)
//! - Load enabled rules into the rule engine
//! - Route MQTT telemetry into ingestion and run the action workers
//! - Sweep the reading cache for sensors that went quiet
//! - Handle graceful shutdown (SIGINT): stop intake, drain ingestion, then
//!   drain the action queue
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use greenhub_adapter_notify_http::HttpNotifier;
use greenhub_adapter_storage_sqlite_sqlx::{
    Config as StorageConfig, SqliteDeviceRepository, SqliteExecutionLog, SqliteReadingRepository,
    SqliteRuleRepository, SqliteSensorRepository,
};
use greenhub_app::action_queue::ActionQueue;
use greenhub_app::cache::InMemoryReadingCache;
use greenhub_app::discovery::SensorResolver;
use greenhub_app::executor::{ActionExecutor, ActionWorker};
use greenhub_app::ingestion::{IngestionRouter, TelemetryIngestor};
use greenhub_app::notification::NotificationDispatcher;
use greenhub_app::ports::RuleRepository;
use greenhub_app::rule_engine::RuleEngine;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let mut db_config = StorageConfig::new(config.database.url.clone());
    db_config.max_connections = config.database.max_connections;
    let db = db_config.build().await?;
    let pool = db.pool().clone();

    // Repositories
    let sensor_repo = SqliteSensorRepository::new(pool.clone());
    let device_repo = SqliteDeviceRepository::new(pool.clone());
    let reading_repo = SqliteReadingRepository::new(pool.clone());
    let rule_repo = SqliteRuleRepository::new(pool.clone());
    let execution_log = SqliteExecutionLog::new(pool);

    // Rule engine
    let cache = Arc::new(InMemoryReadingCache::new(config.engine.cache_ttl()));
    let queue = Arc::new(ActionQueue::new(config.engine.queue_capacity));
    let engine = Arc::new(
        RuleEngine::new(
            Arc::clone(&cache),
            rule_repo.clone(),
            execution_log.clone(),
            Arc::clone(&queue),
        )
        .with_audit_all(config.engine.audit_all_evaluations),
    );
    engine.load(rule_repo.get_enabled().await?).await;
    tracing::info!(rules = engine.len(), "Rules loaded");

    // Actions
    let (publisher, listener) = greenhub_adapter_mqtt::connect(&config.mqtt);
    let notifier = HttpNotifier::new(config.notifications.transports.clone())?;
    let dispatcher = NotificationDispatcher::new(notifier, config.notifications.retry_policy());
    tracing::info!(transports = ?dispatcher.available(), "Notification transports ready");
    let executor = Arc::new(
        ActionExecutor::new(
            device_repo,
            publisher,
            dispatcher,
            config.notifications.defaults(),
        )
        .with_publish_timeout(config.engine.publish_timeout()),
    );

    let mut workers = JoinSet::new();
    for _ in 0..config.engine.action_workers {
        let worker = ActionWorker::new(
            Arc::clone(&queue),
            Arc::clone(&executor),
            execution_log.clone(),
        );
        workers.spawn(async move { worker.run().await });
    }

    let sweeper = tokio::spawn(sweep_stale_sensors(
        Arc::clone(&cache),
        config.engine.sweep_interval(),
    ));

    // Ingestion
    let ingestor = Arc::new(TelemetryIngestor::new(
        SensorResolver::new(sensor_repo),
        reading_repo,
        cache,
        engine,
    ));
    let mut router = IngestionRouter::new(ingestor, config.engine.ingest_channel_depth);

    tracing::info!(
        broker = %config.mqtt.broker_host,
        port = config.mqtt.broker_port,
        topics = ?config.mqtt.telemetry_topics,
        "greenhubd started"
    );
    listener
        .run(
            |topic, payload| {
                router.route(topic, payload);
            },
            shutdown_signal(),
        )
        .await;

    // Shutdown: ingestion first so late triggers still reach the queue.
    router.shutdown().await;
    queue.close();
    while let Some(result) = workers.join_next().await {
        if let Err(err) = result {
            tracing::warn!(error = %err, "Action worker ended abnormally");
        }
    }
    sweeper.abort();
    db.close().await;
    tracing::info!("greenhubd stopped");

    Ok(())
}

async fn sweep_stale_sensors(cache: Arc<InMemoryReadingCache>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        for sensor_id in cache.sweep_expired() {
            tracing::warn!(%sensor_id, "No reading within TTL, sensor possibly offline");
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown requested"),
        Err(err) => {
            tracing::error!(error = %err, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
