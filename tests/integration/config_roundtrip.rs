use podwarden::adapters::LogAllocationSink;
use podwarden::cycle::NoMetrics;
use podwarden::pod::{DECISION_CYCLE_TASK, Pod};
use podwarden::scheduler::{Cadence, DailyAnchor};
use podwarden::{PodConfig, PodError};

const OPERATOR_TOML: &str = r#"
[pod]
id = "pod-east"
environment = "backtest"
capital = 250000.0

[regime]
hysteresis_count = 2

[regime.thresholds]
panic_drawdown = 0.25

[selector]
max_concurrent = 2
allocation_cap_pct = 0.5

[[workloads]]
id = "momentum"

[[workloads]]
id = "carry"
max_positions = 3
max_position_pct = 0.5

[[workloads]]
id = "legacy_pairs"
enabled = false

[eligibility]
CALM = ["momentum", "carry", "legacy_pairs"]
NEUTRAL = ["carry"]
PANIC = []

[phase]
maintenance_start = "21:00"
maintenance_end = "23:30"

[scheduler]
tick_interval_secs = 30
decision_cycle = { type = "interval", minutes = 10 }
exit_review = { type = "daily", anchor = { hour = 14, min = 30, tolerance_mins = 20 } }
"#;

#[test]
fn operator_config_builds_a_pod() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, OPERATOR_TOML).expect("write config");

    let config = PodConfig::from_file(&path).expect("parse config");
    assert_eq!(config.regime.thresholds.panic_drawdown, 0.25);
    assert_eq!(
        config.scheduler.exit_review,
        Cadence::Daily {
            anchor: Some(DailyAnchor {
                hour: 14,
                min: 30,
                tolerance_mins: 20,
            }),
        }
    );

    let pod = Pod::build(&config, Box::new(NoMetrics), Box::new(LogAllocationSink))
        .expect("pod builds");
    let task = pod
        .scheduler()
        .tasks()
        .find(|t| t.name == DECISION_CYCLE_TASK)
        .expect("decision cycle");
    assert_eq!(task.cadence, Cadence::Interval { minutes: 10 });
    assert!(pod.context().task_state_path().is_none());
}

#[test]
fn saved_config_reloads_identically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let original: PodConfig = toml::from_str(OPERATOR_TOML).expect("parse");
    let path = dir.path().join("nested").join("config.toml");
    original.save_to_file(&path).expect("save");

    let reloaded = PodConfig::from_file(&path).expect("reload");
    assert_eq!(reloaded.workloads, original.workloads);
    assert_eq!(reloaded.eligibility, original.eligibility);
    assert_eq!(
        reloaded.scheduler.decision_cycle,
        original.scheduler.decision_cycle
    );
    assert!(reloaded.validate().is_ok());
}

#[test]
fn midnight_crossing_daily_window_is_unsupported() {
    let mut config: PodConfig = toml::from_str(OPERATOR_TOML).expect("parse");
    config.scheduler.exit_review = Cadence::Daily {
        anchor: Some(DailyAnchor {
            hour: 23,
            min: 50,
            tolerance_mins: 30,
        }),
    };
    let err = Pod::build(&config, Box::new(NoMetrics), Box::new(LogAllocationSink))
        .expect_err("must reject");
    assert!(matches!(err, PodError::Unsupported(_)));
    assert!(err.is_config());
}

#[test]
fn unknown_workload_in_eligibility_fails_startup() {
    let mut config: PodConfig = toml::from_str(OPERATOR_TOML).expect("parse");
    config
        .eligibility
        .insert("STRESSED".to_owned(), vec!["momentun".to_owned()]);
    let err = Pod::build(&config, Box::new(NoMetrics), Box::new(LogAllocationSink))
        .expect_err("must reject");
    assert!(err.to_string().contains("momentun"));
}
