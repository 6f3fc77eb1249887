use crate::helpers::{at, file_pod, paper_config, read_allocations, write_stressed};
use chrono::Duration;
use podwarden::persist::staging_path;
use podwarden::pod::DECISION_CYCLE_TASK;
use podwarden::scheduler::{ManualClock, TaskStateStore};
use std::time::Duration as StdDuration;
use tokio_util::sync::CancellationToken;

#[test]
fn restarted_pod_does_not_rerun_completed_work() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = paper_config(dir.path());
    crate::helpers::write_calm(dir.path());
    let clock = ManualClock::new(at(10, 14, 0));

    let mut first = file_pod(&config, &clock);
    assert_eq!(first.tick().len(), 1);
    drop(first);

    // Two minutes later a fresh process sees the persisted run.
    clock.advance(Duration::minutes(2));
    let mut second = file_pod(&config, &clock);
    assert_eq!(
        second.state().last_run(DECISION_CYCLE_TASK),
        Some(at(10, 14, 0))
    );
    assert!(second.tick().is_empty());

    clock.advance(Duration::minutes(3));
    assert_eq!(second.tick().len(), 1);
}

#[test]
fn regime_confirmation_carries_across_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = paper_config(dir.path());
    crate::helpers::write_calm(dir.path());
    let clock = ManualClock::new(at(10, 14, 0));

    let mut first = file_pod(&config, &clock);
    first.tick();
    write_stressed(dir.path());
    clock.advance(Duration::minutes(5));
    first.tick();
    drop(first);

    // One stressed vote is pending in the checkpoint; the next one confirms.
    clock.advance(Duration::minutes(5));
    let mut second = file_pod(&config, &clock);
    second.tick();
    let published = read_allocations(dir.path());
    assert_eq!(published["regime"], "STRESSED");
    assert_eq!(published["transitioned"], true);
}

#[test]
fn interrupted_state_write_keeps_previous_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = paper_config(dir.path());
    let state_path = config.context().task_state_path().expect("paper persists");

    let mut store = TaskStateStore::open(Some(state_path.clone()));
    store
        .update(DECISION_CYCLE_TASK, at(10, 9, 0))
        .expect("update");
    let committed = std::fs::read_to_string(&state_path).expect("state file");

    std::fs::write(
        staging_path(&state_path),
        r#"{"decision_cycle": "2026-03-10T09"#,
    )
    .expect("partial staging file");

    let reloaded = TaskStateStore::open(Some(state_path.clone()));
    assert_eq!(reloaded.last_run(DECISION_CYCLE_TASK), Some(at(10, 9, 0)));
    assert_eq!(std::fs::read_to_string(&state_path).unwrap(), committed);
}

#[test]
fn corrupt_state_file_boots_fresh() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = paper_config(dir.path());
    crate::helpers::write_calm(dir.path());
    let state_path = config.context().task_state_path().expect("paper persists");
    std::fs::create_dir_all(state_path.parent().unwrap()).unwrap();
    std::fs::write(&state_path, "\u{0}\u{0}garbage").unwrap();

    let clock = ManualClock::new(at(10, 14, 0));
    let mut scheduler = file_pod(&config, &clock);
    assert!(scheduler.state().records().is_empty());
    assert_eq!(scheduler.tick().len(), 1);
}

#[tokio::test]
async fn shutdown_flushes_and_reports_final_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = paper_config(dir.path());
    crate::helpers::write_calm(dir.path());
    let clock = ManualClock::new(at(10, 14, 0));
    let scheduler = file_pod(&config, &clock).with_tick_interval(StdDuration::from_millis(10));

    let cancel = CancellationToken::new();
    let handle = scheduler.run(cancel.clone());
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    cancel.cancel();
    let snapshot = handle.await.expect("scheduler joins");

    let status = snapshot
        .tasks
        .iter()
        .find(|t| t.name == DECISION_CYCLE_TASK)
        .expect("decision cycle registered");
    assert_eq!(status.last_run, Some(at(10, 14, 0)));

    let reloaded = TaskStateStore::open(config.context().task_state_path());
    assert_eq!(reloaded.last_run(DECISION_CYCLE_TASK), Some(at(10, 14, 0)));
}

#[cfg(unix)]
#[tokio::test]
async fn sigterm_shuts_down_gracefully() {
    use podwarden::adapters::{JsonFileAllocationSink, JsonFileMetricsSource};
    use podwarden::pod::{Pod, shutdown_signal};

    let dir = tempfile::tempdir().expect("tempdir");
    let config = paper_config(dir.path());
    crate::helpers::write_calm(dir.path());
    let metrics = config.io.metrics_path.clone().expect("metrics path");
    let allocations = config.io.allocations_path.clone().expect("allocations path");
    let pod = Pod::build(
        &config,
        Box::new(JsonFileMetricsSource::new(metrics)),
        Box::new(JsonFileAllocationSink::new(allocations)),
    )
    .expect("pod builds");

    let running = tokio::spawn(pod.run_until(shutdown_signal()));
    tokio::time::sleep(StdDuration::from_millis(50)).await;

    let status = std::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .expect("send SIGTERM");
    assert!(status.success());

    let snapshot = tokio::time::timeout(StdDuration::from_secs(5), running)
        .await
        .expect("stops on SIGTERM")
        .expect("scheduler joins")
        .expect("clean shutdown");

    let reloaded = TaskStateStore::open(config.context().task_state_path());
    for task in &snapshot.tasks {
        assert_eq!(reloaded.last_run(&task.name), task.last_run);
    }
}
