//! Headless pod host.
//!
//! Loads the pod configuration (path from the first argument, otherwise the
//! default config path), wires the file-backed collaborators and runs the
//! scheduler until Ctrl-C or SIGTERM. Shutdown waits for the in-flight tick
//! and flushes task state before exiting.

use anyhow::Context;
use podwarden::PodConfig;
use podwarden::adapters::{JsonFileAllocationSink, JsonFileMetricsSource, LogAllocationSink};
use podwarden::config::LoggingConfig;
use podwarden::cycle::{AllocationSink, MetricsSource, NoMetrics};
use podwarden::pod::{Pod, shutdown_signal};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(PodConfig::default_config_path);

    let config = if config_path.exists() {
        PodConfig::from_file(&config_path)
            .with_context(|| format!("cannot load {}", config_path.display()))?
    } else {
        PodConfig::default()
    };

    let _log_guard = init_tracing(&config.logging)?;
    if !config_path.exists() {
        tracing::warn!(path = %config_path.display(), "config not found, using defaults");
    }

    let metrics: Box<dyn MetricsSource> = match &config.io.metrics_path {
        Some(path) => Box::new(JsonFileMetricsSource::new(path)),
        None => {
            tracing::warn!("io.metrics_path not set; decision cycles will fail until configured");
            Box::new(NoMetrics)
        }
    };
    let sink: Box<dyn AllocationSink> = match &config.io.allocations_path {
        Some(path) => Box::new(JsonFileAllocationSink::new(path)),
        None => Box::new(LogAllocationSink),
    };

    let pod = Pod::build(&config, metrics, sink).context("invalid pod configuration")?;
    tracing::info!(
        pod = %pod.context().pod_id(),
        state_dir = %pod.context().state_dir().display(),
        "podwarden-host starting"
    );

    let snapshot = pod
        .run_until(shutdown_signal())
        .await
        .context("scheduler task failed")?;
    for task in &snapshot.tasks {
        tracing::info!(
            task = %task.name,
            last_run = ?task.last_run,
            "final task state"
        );
    }
    tracing::info!("podwarden-host shut down cleanly");
    Ok(())
}

/// Stderr logging plus an optional daily rolling file.
fn init_tracing(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "podwarden.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter())
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter())
                .with(stderr)
                .init();
            Ok(None)
        }
    }
}
