use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use checkrun::{
    prepare_command, CommandSpec, EngineConfig, Process, ProcessEngine, ProcessResult,
    RuntimeExecutor, SpawnStrategy, TIMEOUT_MARKER,
};
use tokio::sync::oneshot;

fn engine(strategy: SpawnStrategy) -> ProcessEngine {
    let cfg = EngineConfig {
        strategy,
        ..EngineConfig::default()
    };
    let executor = Arc::new(RuntimeExecutor::current().expect("tokio context"));
    ProcessEngine::new(cfg, executor).expect("engine builds")
}

async fn run_one(
    engine: &ProcessEngine,
    spec: CommandSpec,
    timeout: f64,
) -> ProcessResult {
    let mut process = Process::new(prepare_command(spec), BTreeMap::new());
    process.set_timeout(timeout);

    let (tx, rx) = oneshot::channel();
    engine.run(process, move |result| {
        let _ = tx.send(result);
    });

    tokio::time::timeout(Duration::from_secs(30), rx)
        .await
        .expect("result within 30s")
        .expect("callback delivered")
}

#[cfg(unix)]
#[tokio::test]
async fn long_command_is_killed_at_the_deadline() {
    let engine = engine(SpawnStrategy::Direct);

    let started = Instant::now();
    let result = run_one(&engine, CommandSpec::Argv(vec!["sleep".into(), "10".into()]), 1.0).await;
    let elapsed = started.elapsed();

    assert!(result.output.ends_with(TIMEOUT_MARKER));
    assert_ne!(result.exit_status, 0);
    // Delivered within one poll interval or so of the 1s deadline.
    assert!(elapsed >= Duration::from_millis(900), "killed too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "killed too late: {elapsed:?}");
    assert!(result.duration() >= 0.9);
    assert!(result.duration() < 3.0);
}

#[cfg(unix)]
#[tokio::test]
async fn zero_timeout_never_marks_output() {
    let engine = engine(SpawnStrategy::Direct);
    let result = run_one(
        &engine,
        CommandSpec::Shell("sleep 0.3; echo done".into()),
        0.0,
    )
    .await;

    assert_eq!(result.exit_status, 0);
    assert!(result.output.contains("done\n"));
    assert!(!result.output.contains(TIMEOUT_MARKER));
}

#[cfg(unix)]
#[tokio::test]
async fn output_before_the_deadline_survives_the_marker() {
    let engine = engine(SpawnStrategy::Direct);
    let result = run_one(
        &engine,
        CommandSpec::Shell("echo early; sleep 10".into()),
        1.0,
    )
    .await;

    assert!(result.output.contains("early\n"));
    assert!(result.output.ends_with(TIMEOUT_MARKER));
}

#[cfg(unix)]
#[tokio::test]
async fn whole_process_group_dies_on_timeout() {
    let engine = engine(SpawnStrategy::Direct);

    // The shell exits only when both background sleeps do; without a group
    // kill the pipe stays open and delivery would stall for 30s.
    let started = Instant::now();
    let result = run_one(
        &engine,
        CommandSpec::Shell("sleep 30 & sleep 30 & wait".into()),
        1.0,
    )
    .await;
    let elapsed = started.elapsed();

    assert!(result.output.ends_with(TIMEOUT_MARKER));
    assert!(elapsed < Duration::from_secs(10), "group not killed: {elapsed:?}");
}

#[cfg(unix)]
#[tokio::test]
async fn delegated_strategy_enforces_timeouts_too() {
    let engine = engine(SpawnStrategy::Delegated);

    let started = Instant::now();
    let result = run_one(&engine, CommandSpec::Argv(vec!["sleep".into(), "10".into()]), 1.0).await;
    let elapsed = started.elapsed();

    assert!(result.output.ends_with(TIMEOUT_MARKER));
    assert!(elapsed < Duration::from_secs(5), "killed too late: {elapsed:?}");
}
