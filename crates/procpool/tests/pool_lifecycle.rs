//! End-to-end scenarios exercised against real child processes. Every test
//! in this file shares one compiled binary, so `procpool::init()` must run
//! before the test harness parses its own CLI arguments — hence the `ctor`
//! constructor instead of calling `init()` inside each `#[test]`.

use std::convert::Infallible;
use std::time::Duration;

use procpool::{PoolConfig, WorkerConfig};

#[ctor::ctor]
fn init_worker_process() {
    procpool::init();
}

fn double(n: u64) -> Result<u64, Infallible> {
    Ok(n * 2)
}
procpool::register_task!("double", procpool::wrap!(double));

fn sleep_ms(ms: u64) -> Result<(), Infallible> {
    std::thread::sleep(Duration::from_millis(ms));
    Ok(())
}
procpool::register_task!("sleep_ms", procpool::wrap!(sleep_ms));

fn fail_always(_: ()) -> Result<(), String> {
    Err("task-level failure".to_string())
}
procpool::register_task!("fail_always", procpool::wrap!(fail_always));

fn crash_process(_: ()) -> Result<(), Infallible> {
    std::process::exit(7);
}
procpool::register_task!("crash_process", procpool::wrap!(crash_process));

fn noop(_: ()) -> Result<(), Infallible> {
    Ok(())
}
procpool::register_task!("noop", procpool::wrap!(noop));

fn test_pool(workers: usize) -> procpool::Pool {
    let pool = procpool::Pool::new(
        PoolConfig::new(workers).with_sleep_unit(Duration::from_millis(10)),
    );
    pool.start().expect("pool starts");
    pool
}

#[test]
fn happy_path_returns_the_registered_functions_value() {
    let pool = test_pool(2);
    let task: procpool::Task<u64> = pool.submit("double", 21_u64, Some(Duration::from_secs(5))).unwrap();
    assert_eq!(task.get(Some(Duration::from_secs(5))).unwrap(), 42);
    pool.close().unwrap();
}

#[test]
fn user_error_propagates_as_outcome_error() {
    let pool = test_pool(1);
    let task: procpool::Task<()> = pool
        .submit("fail_always", (), Some(Duration::from_secs(5)))
        .unwrap();
    let err = task.get(Some(Duration::from_secs(5))).unwrap_err();
    assert!(matches!(err, procpool::OutcomeError::UserError(_)));
    pool.close().unwrap();
}

#[test]
fn slow_task_resolves_with_timeout_error() {
    let pool = test_pool(1);
    let task: procpool::Task<()> = pool
        .submit("sleep_ms", 2_000_u64, Some(Duration::from_millis(100)))
        .unwrap();
    let err = task.get(Some(Duration::from_secs(5))).unwrap_err();
    assert!(matches!(err, procpool::OutcomeError::Timeout));
    pool.close().unwrap();
}

#[test]
fn cancelling_before_start_prevents_dispatch() {
    let pool = test_pool(1);
    // Occupy the only worker so the second task cannot possibly start
    // before it is cancelled.
    let occupier: procpool::Task<()> = pool
        .submit("sleep_ms", 300_u64, Some(Duration::from_secs(5)))
        .unwrap();

    let cancelled: procpool::Task<()> = pool
        .submit("noop", (), Some(Duration::from_secs(5)))
        .unwrap();
    cancelled.cancel();

    // The scheduler loop must observe the cancellation and drop the task
    // without ever dispatching it, resolving it as cancelled rather than
    // leaving it to time out.
    let err = cancelled.get(Some(Duration::from_secs(5))).unwrap_err();
    assert!(matches!(err, procpool::OutcomeError::Cancelled));

    occupier.get(Some(Duration::from_secs(5))).unwrap();
    pool.close().unwrap();
}

#[test]
fn cancelling_a_running_task_resolves_as_cancelled() {
    let pool = test_pool(1);
    let task: procpool::Task<()> = pool
        .submit("sleep_ms", 2_000_u64, Some(Duration::from_secs(5)))
        .unwrap();

    // Give the worker time to claim and start it before cancelling.
    std::thread::sleep(Duration::from_millis(150));
    task.cancel();

    let err = task.get(Some(Duration::from_secs(5))).unwrap_err();
    assert!(matches!(err, procpool::OutcomeError::Cancelled));
    pool.close().unwrap();
}

#[test]
fn a_crashed_worker_resolves_its_task_as_process_expired() {
    let pool = test_pool(1);
    let task: procpool::Task<()> = pool
        .submit("crash_process", (), Some(Duration::from_secs(5)))
        .unwrap();

    let err = task.get(Some(Duration::from_secs(5))).unwrap_err();
    match err {
        procpool::OutcomeError::ProcessExpired { exit_code } => assert_eq!(exit_code, 7),
        other => panic!("expected ProcessExpired, got {other:?}"),
    }
    pool.close().unwrap();
}

#[test]
fn pool_recovers_worker_count_after_a_crash() {
    let pool = test_pool(2);
    let _crashed: procpool::Task<()> = pool
        .submit("crash_process", (), Some(Duration::from_secs(5)))
        .unwrap();
    _crashed.get(Some(Duration::from_secs(5))).ok();

    // Give the status loop a chance to reprovision, then confirm the pool
    // still services new work with its full worker count.
    std::thread::sleep(Duration::from_millis(200));
    let task: procpool::Task<u64> = pool.submit("double", 10_u64, Some(Duration::from_secs(5))).unwrap();
    assert_eq!(task.get(Some(Duration::from_secs(5))).unwrap(), 20);
    pool.close().unwrap();
}

#[test]
fn worker_config_task_limit_recycles_the_worker() {
    let pool = procpool::Pool::new(
        PoolConfig::new(1)
            .with_sleep_unit(Duration::from_millis(10))
            .with_worker_config(WorkerConfig {
                task_limit: 1,
                ..WorkerConfig::default()
            }),
    );
    pool.start().expect("pool starts");

    for expected in [1_u64, 2, 3] {
        let task: procpool::Task<u64> = pool
            .submit("double", expected, Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(task.get(Some(Duration::from_secs(5))).unwrap(), expected * 2);
    }
    pool.close().unwrap();
}
