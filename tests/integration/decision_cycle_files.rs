use crate::helpers::{at, file_pod, paper_config, read_allocations, write_calm, write_stressed};
use chrono::Duration;
use podwarden::pod::DECISION_CYCLE_TASK;
use podwarden::scheduler::{ManualClock, TaskRunOutcome};

#[test]
fn cycle_publishes_allocations_and_follows_regime() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = paper_config(dir.path());
    let clock = ManualClock::new(at(10, 14, 0));
    let mut scheduler = file_pod(&config, &clock);

    write_calm(dir.path());
    let reports = scheduler.tick();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].task, DECISION_CYCLE_TASK);
    assert_eq!(reports[0].outcome, TaskRunOutcome::Success);

    let published = read_allocations(dir.path());
    assert_eq!(published["regime"], "CALM");
    let ids: Vec<&str> = published["allocations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["workload"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["carry", "momentum"]);
    for alloc in published["allocations"].as_array().unwrap() {
        // min(50_000 / 2, 50_000 * 0.4)
        assert_eq!(alloc["capital"].as_f64(), Some(20_000.0));
    }

    // First stressed reading is held back by hysteresis.
    write_stressed(dir.path());
    clock.advance(Duration::minutes(5));
    scheduler.tick();
    assert_eq!(read_allocations(dir.path())["regime"], "CALM");

    clock.advance(Duration::minutes(5));
    scheduler.tick();
    let published = read_allocations(dir.path());
    assert_eq!(published["regime"], "STRESSED");
    assert_eq!(published["transitioned"], true);
    assert_eq!(published["previous"], "CALM");
    let deactivated: Vec<&str> = published["deactivated"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(deactivated, vec!["carry", "momentum"]);
}

#[test]
fn missing_metrics_fail_and_retry_next_tick() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = paper_config(dir.path());
    let clock = ManualClock::new(at(10, 14, 0));
    let mut scheduler = file_pod(&config, &clock);

    let reports = scheduler.tick();
    assert_eq!(reports[0].outcome, TaskRunOutcome::Failed);
    assert!(scheduler.state().last_run(DECISION_CYCLE_TASK).is_none());
    assert!(!dir.path().join("allocations.json").exists());

    // The feed recovers; the cycle runs on the very next tick even though
    // its five-minute interval has not elapsed.
    write_calm(dir.path());
    clock.advance(Duration::minutes(1));
    let reports = scheduler.tick();
    assert_eq!(reports[0].outcome, TaskRunOutcome::Success);
    assert_eq!(
        scheduler.state().last_run(DECISION_CYCLE_TASK),
        Some(at(10, 14, 1))
    );
}
