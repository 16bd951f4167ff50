mod config;

use anyhow::Context;
use collector::{Collector, CollectorConfig};
use common::domain::ReadingRepository;
use common::postgres::{MigrationRunner, PostgresClient, PostgresReadingRepository};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use config::ServiceConfig;
use redenv_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {:#}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        ttn_app_id = %config.ttn_app_id,
        mqtt_host = %config.mqtt_host,
        postgres_host = %config.postgres_host,
        "starting redenv collector"
    );

    let reference_zone = match config.reference_zone() {
        Ok(zone) => zone,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    let postgres_client = match initialize_postgres(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize PostgreSQL: {:#}", e);
            std::process::exit(1);
        }
    };

    let repository = Arc::new(PostgresReadingRepository::new(postgres_client));
    match repository.latest_recorded_at().await {
        Ok(Some(at)) => info!(last_recorded_at = %at, "resuming after stored readings"),
        Ok(None) => info!("no readings stored yet"),
        Err(e) => warn!(error = %e, "could not read the newest stored reading"),
    }
    let collector = Collector::new(
        repository,
        CollectorConfig {
            subscriber: config.subscriber_config(),
            reference_zone,
        },
    );

    let mut runner = Runner::new();
    for (name, process) in collector.into_runner_processes() {
        runner = runner.with_named_process(name, process);
    }

    runner
        .with_closer(move || async move {
            info!("flushing telemetry");
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await;
}

/// Builds the pool, checks it can connect, then applies migrations.
async fn initialize_postgres(config: &ServiceConfig) -> anyhow::Result<PostgresClient> {
    let pg = config.postgres_config();
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);

    let client = PostgresClient::from_config(&pg)?;
    tokio::time::timeout(startup_timeout, client.ping())
        .await
        .context("timed out connecting to PostgreSQL")??;
    info!(max_pool_size = pg.max_pool_size, "PostgreSQL reachable");

    info!("running PostgreSQL migrations");
    tokio::time::timeout(
        startup_timeout,
        MigrationRunner::from_config(&pg).run_migrations(),
    )
    .await
    .context("timed out running migrations")??;

    Ok(client)
}
