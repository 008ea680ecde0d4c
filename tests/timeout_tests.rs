//! Timeout guard integration tests.
//!
//! The guard bounds the wait, not the work: overrunning workers keep
//! running and their results are discarded.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use devtools::{ConfigError, Phase, TimeoutError, TimeoutGuard};

use common::assertions::{assert_duration_near, assert_phases};
use common::fixtures::{capture, guard, TestError};

#[derive(Debug, PartialEq, Eq)]
struct ValueError(String);

// ── Bound enforcement ─────────────────────────────────────────────

#[test]
fn test_overrun_times_out_at_bound() {
    let (memory, reporter) = capture();
    let guard = guard(Duration::from_millis(100), reporter);

    let start = Instant::now();
    let result: Result<u32, TimeoutError<TestError>> = guard.run("sleepy", || {
        thread::sleep(Duration::from_secs(5));
        Ok(42)
    });
    let waited = start.elapsed();

    match result {
        Err(TimeoutError::TimedOut(err)) => {
            assert_eq!(err.operation, "sleepy");
            assert_eq!(err.bound, Duration::from_millis(100));
            assert_eq!(
                err.to_string(),
                "Function sleepy exceeded the 0.1 seconds timeout."
            );
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert_duration_near(waited, Duration::from_millis(100), Duration::from_millis(400));
    assert_phases(&memory, &[Phase::Timeout]);
}

#[test]
fn test_fast_operation_returns_promptly() {
    let (memory, reporter) = capture();
    let guard = guard(Duration::from_secs(1), reporter);

    let start = Instant::now();
    let result: Result<&str, TimeoutError<TestError>> = guard.run("quick", || {
        thread::sleep(Duration::from_millis(10));
        Ok("ok")
    });
    assert_eq!(result.unwrap(), "ok");
    assert!(start.elapsed() < Duration::from_millis(500));
    assert!(memory.events().is_empty());
}

#[test]
fn test_failure_inside_bound_is_returned_verbatim() {
    let (_, reporter) = capture();
    let guard = guard(Duration::from_secs(1), reporter);

    let result: Result<(), TimeoutError<ValueError>> =
        guard.run("validate", || Err(ValueError("bad".to_string())));
    let err = result.unwrap_err();
    assert!(!err.is_timeout());
    assert_eq!(err.into_failure(), Some(ValueError("bad".to_string())));
}

#[test]
fn test_worker_keeps_running_after_timeout() {
    let (_, reporter) = capture();
    let guard = guard(Duration::from_millis(20), reporter);
    let finished = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&finished);
    let result: Result<(), TimeoutError<TestError>> = guard.run("background", move || {
        thread::sleep(Duration::from_millis(150));
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });
    assert!(result.unwrap_err().is_timeout());
    assert!(!finished.load(Ordering::SeqCst));

    thread::sleep(Duration::from_millis(400));
    assert!(finished.load(Ordering::SeqCst));
}

#[test]
fn test_drain_waits_for_worker_before_timing_out() {
    let (_, reporter) = capture();
    let guard = guard(Duration::from_millis(20), reporter).drain_on_timeout(true);
    let finished = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&finished);
    let result: Result<u8, TimeoutError<TestError>> = guard.run("drained", move || {
        thread::sleep(Duration::from_millis(100));
        flag.store(true, Ordering::SeqCst);
        Ok(1)
    });
    assert!(result.unwrap_err().is_timeout());
    assert!(finished.load(Ordering::SeqCst));
}

// ── Construction ──────────────────────────────────────────────────

#[test]
fn test_rejects_zero_and_negative_bounds() {
    assert!(matches!(
        TimeoutGuard::from_secs_f64(0.0),
        Err(ConfigError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        TimeoutGuard::from_secs_f64(-1.0),
        Err(ConfigError::InvalidConfiguration(_))
    ));
    assert!(TimeoutGuard::new(Duration::ZERO).is_err());
    assert_eq!(TimeoutGuard::default().bound(), Duration::from_secs(10));
}

// ── Async ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_async_overrun_times_out() {
    let (memory, reporter) = capture();
    let guard = guard(Duration::from_millis(50), reporter);

    let start = Instant::now();
    let result: Result<u32, TimeoutError<TestError>> = guard
        .run_async("async_sleepy", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(42)
        })
        .await;
    assert!(result.unwrap_err().is_timeout());
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(memory.phase(Phase::Timeout).len(), 1);
}

#[tokio::test]
async fn test_async_value_and_failure() {
    let (_, reporter) = capture();
    let guard = guard(Duration::from_secs(1), reporter);

    let ok: Result<&str, TimeoutError<ValueError>> =
        guard.run_async("async_quick", async { Ok("ok") }).await;
    assert_eq!(ok.unwrap(), "ok");

    let failed: Result<(), TimeoutError<ValueError>> = guard
        .run_async("async_bad", async { Err(ValueError("bad".to_string())) })
        .await;
    assert_eq!(
        failed.unwrap_err().into_failure(),
        Some(ValueError("bad".to_string()))
    );
}

#[tokio::test]
#[should_panic(expected = "task exploded")]
async fn test_async_panic_is_resumed() {
    let guard = TimeoutGuard::new(Duration::from_secs(1)).unwrap();
    let _: Result<(), TimeoutError<TestError>> = guard
        .run_async("explode", async {
            if true {
                panic!("task exploded");
            }
            Ok(())
        })
        .await;
}

// ── Wrapping ──────────────────────────────────────────────────────

#[test]
fn test_wrapped_operation_is_reusable() {
    let (memory, reporter) = capture();
    let guard = guard(Duration::from_millis(100), reporter);
    let nap = guard.wrap("nap", |millis: u64| {
        thread::sleep(Duration::from_millis(millis));
        Ok::<_, TestError>(millis)
    });

    assert_eq!(nap(1).unwrap(), 1);
    assert!(nap(1_000).unwrap_err().is_timeout());
    assert_eq!(nap(2).unwrap(), 2);
    assert_eq!(memory.phase(Phase::Timeout).len(), 1);
}
