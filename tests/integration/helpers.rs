//! Shared helpers for integration tests.

use chrono::{DateTime, TimeZone, Utc};
use podwarden::PodConfig;
use podwarden::adapters::{JsonFileAllocationSink, JsonFileMetricsSource};
use podwarden::config::WorkloadSpec;
use podwarden::context::PodEnvironment;
use podwarden::pod::Pod;
use podwarden::scheduler::{ManualClock, Scheduler};
use std::path::Path;

/// 2026-03-<day> at `hour:min` UTC.
pub(crate) fn at(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, min, 0)
        .single()
        .expect("valid timestamp")
}

/// Paper-trading config persisting under `dir`, with file-backed metrics
/// and allocations.
pub(crate) fn paper_config(dir: &Path) -> PodConfig {
    let mut config = PodConfig::default();
    config.pod.id = "pod-a".to_owned();
    config.pod.environment = PodEnvironment::Paper;
    config.pod.state_dir = Some(dir.join("state"));
    config.pod.capital = 50_000.0;
    config.regime.hysteresis_count = 2;
    config.workloads = vec![
        WorkloadSpec::new("momentum"),
        WorkloadSpec::new("carry"),
        WorkloadSpec::new("hedge"),
    ];
    config.eligibility.insert(
        "CALM".to_owned(),
        vec!["momentum".to_owned(), "carry".to_owned()],
    );
    config
        .eligibility
        .insert("STRESSED".to_owned(), vec!["hedge".to_owned()]);
    config
        .eligibility
        .insert("NEUTRAL".to_owned(), vec!["carry".to_owned()]);
    config.io.metrics_path = Some(dir.join("metrics.json"));
    config.io.allocations_path = Some(dir.join("allocations.json"));
    config
}

pub(crate) fn write_metrics(dir: &Path, volatility: f64, trend_slope: f64, drawdown: f64) {
    let body = serde_json::json!({
        "volatility": volatility,
        "trend_slope": trend_slope,
        "drawdown": drawdown,
    });
    std::fs::write(dir.join("metrics.json"), body.to_string()).expect("write metrics");
}

pub(crate) fn write_calm(dir: &Path) {
    write_metrics(dir, 0.10, 0.02, 0.01);
}

pub(crate) fn write_stressed(dir: &Path) {
    write_metrics(dir, 0.35, 0.0, 0.03);
}

pub(crate) fn read_allocations(dir: &Path) -> serde_json::Value {
    let raw = std::fs::read_to_string(dir.join("allocations.json")).expect("allocations file");
    serde_json::from_str(&raw).expect("allocations json")
}

/// Scheduler for a file-backed pod driven by `clock`.
pub(crate) fn file_pod(config: &PodConfig, clock: &ManualClock) -> Scheduler {
    let metrics = config.io.metrics_path.clone().expect("metrics path");
    let allocations = config.io.allocations_path.clone().expect("allocations path");
    Pod::build(
        config,
        Box::new(JsonFileMetricsSource::new(metrics)),
        Box::new(JsonFileAllocationSink::new(allocations)),
    )
    .expect("pod builds")
    .into_scheduler()
    .with_clock(clock.clone())
}
