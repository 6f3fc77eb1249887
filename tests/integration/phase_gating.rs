use crate::helpers::{at, file_pod, paper_config, write_calm};
use chrono::Duration;
use podwarden::Phase;
use podwarden::pod::DECISION_CYCLE_TASK;
use podwarden::scheduler::{Cadence, ManualClock, RequiredPhase, TaskDefinition};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn decision_and_maintenance_tasks_never_overlap() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = paper_config(dir.path());
    write_calm(dir.path());
    let clock = ManualClock::new(at(10, 20, 0));
    let mut scheduler = file_pod(&config, &clock);

    let retrains = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&retrains);
    scheduler
        .register(
            TaskDefinition::new(
                "nightly_retrain",
                Cadence::Daily { anchor: None },
                RequiredPhase::Maintenance,
            ),
            Box::new(move |run| {
                assert_eq!(run.phase, Phase::Maintenance);
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("retrained".to_owned())
            }),
        )
        .unwrap();

    // Walk 20:00 → 00:00 minute by minute and check every run's phase.
    let mut runs = Vec::new();
    for _ in 0..240 {
        runs.extend(scheduler.tick());
        clock.advance(Duration::minutes(1));
    }

    for report in &runs {
        let expected = if report.task == DECISION_CYCLE_TASK {
            Phase::Decision
        } else {
            Phase::Maintenance
        };
        assert_eq!(report.phase, expected, "{} ran in {}", report.task, report.phase);
        assert_eq!(scheduler.phase_at(report.started_at), expected);
    }

    assert_eq!(retrains.load(Ordering::SeqCst), 1);
    let cycles: Vec<_> = runs
        .iter()
        .filter(|r| r.task == DECISION_CYCLE_TASK)
        .map(|r| r.started_at)
        .collect();
    // 20:00..20:55 every five minutes, then 23:30..23:55 after maintenance.
    assert_eq!(cycles.len(), 12 + 6);
    assert!(cycles.iter().all(|t| *t < at(10, 21, 0) || *t >= at(10, 23, 30)));
}
