use std::{sync::Arc, time::Duration};

use clap::Parser;
use nhanhoc_api::{
    AppState, CompletionClient, CompletionConfig, OpenAiCompletionClient, OperationSettings,
    api_router, builtin_registry,
};
use nhanhoc_common::error::{NhanhocError, Result};
use nhanhoc_jobs::{FanOutCoordinator, JobRunner, JobStore, RetentionPolicy, spawn_retention_sweeper};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nhanhoc", about = "Background job service for AI-backed learning tools")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value = "8000")]
    port: u16,

    /// Base URL of an OpenAI-compatible API.
    #[arg(long, default_value = "https://api.openai.com/v1")]
    completion_url: String,

    #[arg(long, default_value = "gpt-4o-mini")]
    completion_model: String,

    #[arg(long, default_value_t = 120)]
    completion_timeout_secs: u64,

    /// Typical completion latency, used to pace progress reporting.
    #[arg(long, default_value_t = 20)]
    completion_latency_secs: u64,

    #[arg(long, default_value_t = 3)]
    fanout_concurrency: usize,

    #[arg(long, default_value_t = 15)]
    fanout_timeout_secs: u64,

    /// How long finished jobs stay queryable.
    #[arg(long, default_value_t = 3600)]
    job_ttl_secs: u64,

    #[arg(long, default_value_t = 60)]
    sweep_interval_secs: u64,

    #[arg(long, default_value_t = 30)]
    shutdown_grace_secs: u64,
}

impl Cli {
    fn validate(&self) -> Result<()> {
        if self.fanout_concurrency == 0 {
            return Err(NhanhocError::InvalidArgument(
                "--fanout-concurrency must be at least 1".to_string(),
            ));
        }
        if self.fanout_timeout_secs == 0 || self.completion_timeout_secs == 0 {
            return Err(NhanhocError::InvalidArgument(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(NhanhocError::InvalidArgument(
                "--sweep-interval-secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn completion_config(&self, api_key: Option<String>) -> CompletionConfig {
        CompletionConfig {
            base_url: self.completion_url.clone(),
            model: self.completion_model.clone(),
            api_key,
            timeout: Duration::from_secs(self.completion_timeout_secs),
        }
    }

    fn operation_settings(&self) -> OperationSettings {
        OperationSettings {
            completion_latency: Duration::from_secs(self.completion_latency_secs),
            fanout_timeout: Duration::from_secs(self.fanout_timeout_secs),
        }
    }

    fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            ttl: Duration::from_secs(self.job_ttl_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::from_default_env().add_directive("nhanhoc=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    cli.validate()?;
    let addr = format!("{}:{}", cli.host, cli.port);

    let api_key = std::env::var("NHANHOC_COMPLETION_API_KEY")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    if api_key.is_none() {
        warn!("NHANHOC_COMPLETION_API_KEY is not set, completion requests are unauthenticated");
    }
    let client: Arc<dyn CompletionClient> =
        Arc::new(OpenAiCompletionClient::new(&cli.completion_config(api_key))?);

    let store = JobStore::new();
    let runner = JobRunner::new(store.clone());
    let coordinator = FanOutCoordinator::new(cli.fanout_concurrency);
    let registry = builtin_registry(client, coordinator, cli.operation_settings());
    info!(operations = ?registry.names(), "operations registered");

    let shutdown = CancellationToken::new();
    let sweeper = spawn_retention_sweeper(store, cli.retention_policy(), shutdown.clone());
    info!(ttl_secs = cli.job_ttl_secs, "job retention sweeper enabled");

    let app = api_router(Arc::new(AppState::new(runner.clone(), registry)));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("nhanhoc server listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let report = runner
        .drain(Duration::from_secs(cli.shutdown_grace_secs))
        .await;
    info!(
        finished = report.finished.len(),
        cancelled = report.cancelled.len(),
        "outstanding jobs drained"
    );

    shutdown.cancel();
    sweeper.await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
