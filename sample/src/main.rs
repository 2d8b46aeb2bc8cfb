//! Sample service: a MongoDB health check behind `/healthz`

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use mongo_health::{HealthRegistry, HealthStatus, MongoCheckOptions, MongoHealthCheckExt};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mongo-health-sample")]
#[command(about = "Serves /healthz backed by a MongoDB liveness check", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "sample.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct Settings {
    /// Address the HTTP server binds to
    #[serde(default = "default_listen")]
    listen: String,
    mongo: MongoSettings,
}

#[derive(Debug, Deserialize)]
struct MongoSettings {
    uri: String,
    #[serde(default = "default_check_name")]
    check_name: String,
    #[serde(default = "default_probe_timeout_ms")]
    probe_timeout_ms: u64,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_check_name() -> String {
    "MongoSampleCheck".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let raw = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("failed to read config file {}", cli.config.display()))?;
    let settings: Settings = serde_yaml::from_str(&raw).context("failed to parse config file")?;

    let registry = HealthRegistry::new()
        .add_mongo_uri(
            &settings.mongo.uri,
            MongoCheckOptions::new()
                .name(settings.mongo.check_name.clone())
                .timeout(Duration::from_millis(settings.mongo.probe_timeout_ms)),
        )
        .context("failed to register MongoDB health check")?;

    tracing::info!(check = %settings.mongo.check_name, "MongoDB health check registered");

    let app = Router::new()
        .route("/", get(|| async { Redirect::temporary("/healthz") }))
        .route("/healthz", get(healthz))
        .with_state(Arc::new(registry));

    let listener = tokio::net::TcpListener::bind(&settings.listen)
        .await
        .with_context(|| format!("failed to bind {}", settings.listen))?;
    tracing::info!(listen = %settings.listen, "sample server started");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run every registered check and serialize the report; 503 when unhealthy
/// so orchestrators treat the pod as not ready.
async fn healthz(State(registry): State<Arc<HealthRegistry>>) -> impl IntoResponse {
    let report = registry.run(CancellationToken::new()).await;
    let code = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (code, Json(report))
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
