use super::fixtures::{burst_registry, capture_output};
use crate::config::RunConfig;
use crate::engine::VirtualClockEngine;
use crate::harness::{AssemblyHarness, HarnessError};
use crate::registry::AssemblyRegistry;
use crate::types::RunState;
use std::sync::Arc;

fn configured(replications: usize, stop_time: f64) -> RunConfig {
    let mut config = RunConfig::default();
    config.set_number_of_replications(replications).unwrap();
    config.set_stop_time(stop_time).unwrap();
    config
}

/// Test stop observed at the replication boundary
/// - On a current-thread runtime the worker has not run yet when stop is
///   raised, so zero replications execute
#[tokio::test]
async fn test_stop_before_first_replication() {
    let engine = Arc::new(VirtualClockEngine::new());
    let harness = AssemblyHarness::with_config(burst_registry(&[3]), engine, configured(100, 10.0));
    let output = capture_output(&harness).await;

    harness.start().await.expect("start run");
    harness.stop();
    harness.wait().await;

    assert_eq!(harness.run_state(), RunState::StoppedByUser);
    assert_eq!(harness.current_replication(), 0);
    assert!(!output.contents().contains("=== Replication 1 Statistics ==="));
    // The summary still prints; the design points simply hold no data.
    assert!(output.contents().contains("=== Summary Statistics (Design Points) ==="));
}

/// Test that a setup fault is reported synchronously
/// - `start` returns the error, the state is Faulted, and no worker runs
#[tokio::test]
async fn test_setup_fault_reported_synchronously() {
    let mut registry = AssemblyRegistry::new();
    registry.add_entity("broken", Box::new(|| Err(anyhow::anyhow!("construction exploded"))));
    let engine = Arc::new(VirtualClockEngine::new());
    let harness = AssemblyHarness::with_config(registry, engine, configured(3, 10.0));
    let output = capture_output(&harness).await;

    let result = harness.start().await;
    assert!(matches!(result, Err(HarnessError::Setup(_))));
    assert_eq!(harness.run_state(), RunState::Faulted);
    assert!(harness
        .last_error()
        .expect("fault cause recorded")
        .contains("construction exploded"));
    assert!(output.contents().is_empty());

    // Faulted persists until an explicit reset.
    harness.wait().await;
    assert_eq!(harness.run_state(), RunState::Faulted);
    harness.reset().await.expect("reset after fault");
    assert_eq!(harness.run_state(), RunState::Idle);
    assert!(harness.last_error().is_none());
}

/// Test start while a run is in progress
#[tokio::test]
async fn test_start_while_running_rejected() {
    let engine = Arc::new(VirtualClockEngine::new());
    let harness = AssemblyHarness::with_config(burst_registry(&[3]), engine, configured(2, 10.0));
    capture_output(&harness).await;

    harness.start().await.expect("start run");
    let second = harness.start().await;
    assert!(matches!(second, Err(HarnessError::AlreadyRunning)));
    harness.wait().await;
}

/// Test reset guard and the pristine state it restores
#[tokio::test]
async fn test_reset_restores_pristine_state() {
    let engine = Arc::new(VirtualClockEngine::new());
    let harness = AssemblyHarness::with_config(burst_registry(&[5, 7, 2]), engine, configured(3, 10.0));
    capture_output(&harness).await;

    harness.start().await.expect("start run");
    assert!(matches!(harness.reset().await, Err(HarnessError::RunInProgress)));
    harness.wait().await;

    {
        let aggregator = harness.aggregator();
        let aggregator = aggregator.lock().await;
        let design = aggregator.design_point("X").unwrap();
        assert_eq!(design.lock().await.count(), 3);
    }

    harness.reset().await.expect("reset after run");
    assert_eq!(harness.run_state(), RunState::Idle);
    assert_eq!(harness.current_replication(), 0);
    assert!(harness.analyst_report_path().is_none());

    let aggregator = harness.aggregator();
    let aggregator = aggregator.lock().await;
    let design = aggregator.design_point("X").unwrap();
    assert_eq!(design.lock().await.count(), 0);
}

/// Test that design points accumulate across back-to-back runs until a
/// reset intervenes
#[tokio::test]
async fn test_design_points_persist_across_runs() {
    let engine = Arc::new(VirtualClockEngine::new());
    let harness = AssemblyHarness::with_config(burst_registry(&[3]), engine, configured(2, 10.0));
    capture_output(&harness).await;

    harness.start().await.expect("first run");
    harness.wait().await;
    harness.start().await.expect("second run");
    harness.wait().await;

    let aggregator = harness.aggregator();
    let aggregator = aggregator.lock().await;
    let design = aggregator.design_point("X").unwrap();
    let design = design.lock().await;
    assert_eq!(design.count(), 4);
    // Every replication of both runs starts from a clean collector, so
    // each terminal count is exactly one burst.
    assert_eq!(design.mean(), 3.0);
    assert_eq!(design.snapshot().max, 3.0);
}

/// Test that run-state transitions land even when nobody holds a state
/// subscription
#[tokio::test]
async fn test_state_tracked_without_subscribers() {
    let engine = Arc::new(VirtualClockEngine::new());
    let harness = AssemblyHarness::with_config(burst_registry(&[3]), engine, configured(100, 10.0));
    capture_output(&harness).await;

    harness.start().await.expect("start run");
    assert!(harness.is_running());
    assert!(matches!(harness.start().await, Err(HarnessError::AlreadyRunning)));

    harness.stop();
    harness.wait().await;
    assert!(!harness.is_running());
    assert_eq!(harness.run_state(), RunState::StoppedByUser);
}

/// Test stop raised in the middle of a run
/// - Stop lands during replication 2, which runs to completion
/// - Exactly two replication reports exist and the state is StoppedByUser
#[tokio::test]
async fn test_stop_mid_run_finishes_current_replication() {
    let mut config = configured(100, 10.0);
    // Single-step makes the engine yield between events so the watcher
    // task below gets scheduled while a replication is in flight.
    config.set_single_step(true);
    let engine = Arc::new(VirtualClockEngine::new());
    let harness = Arc::new(AssemblyHarness::with_config(burst_registry(&[3]), engine, config));
    let output = capture_output(&harness).await;

    harness.start().await.expect("start run");
    let watcher = {
        let harness = harness.clone();
        tokio::spawn(async move {
            while harness.current_replication() < 1 {
                tokio::task::yield_now().await;
            }
            harness.stop();
        })
    };
    harness.wait().await;
    watcher.await.expect("watcher task");

    assert_eq!(harness.run_state(), RunState::StoppedByUser);
    assert_eq!(harness.current_replication(), 2);
    let text = output.contents();
    assert!(text.contains("=== Replication 2 Statistics ==="));
    assert!(!text.contains("=== Replication 3 Statistics ==="));
    assert!(text.contains("=== Summary Statistics (Design Points) ==="));
}

/// Test pause and resume guards when no run is in progress
#[tokio::test]
async fn test_pause_resume_require_running() {
    let engine = Arc::new(VirtualClockEngine::new());
    let harness = AssemblyHarness::with_config(burst_registry(&[3]), engine, configured(1, 10.0));

    assert!(matches!(harness.pause(), Err(HarnessError::NotRunning)));
    assert!(matches!(harness.resume(), Err(HarnessError::NotRunning)));
}

/// Test that configuration is frozen while a run is in progress
#[tokio::test]
async fn test_config_frozen_while_running() {
    let engine = Arc::new(VirtualClockEngine::new());
    let harness = AssemblyHarness::with_config(burst_registry(&[3]), engine, configured(2, 10.0));
    capture_output(&harness).await;

    harness.start().await.expect("start run");
    assert!(matches!(
        harness.set_number_of_replications(9),
        Err(HarnessError::RunInProgress)
    ));
    harness.wait().await;

    harness.set_number_of_replications(9).expect("mutable after run");
    assert_eq!(harness.config().number_of_replications(), 9);
}

/// Test state-change notifications over the watch channel
#[tokio::test]
async fn test_state_notifications() {
    let engine = Arc::new(VirtualClockEngine::new());
    let harness = AssemblyHarness::with_config(burst_registry(&[3]), engine, configured(1, 10.0));
    capture_output(&harness).await;
    let mut states = harness.subscribe_state();
    assert_eq!(*states.borrow_and_update(), RunState::Idle);

    harness.start().await.expect("start run");
    states.changed().await.expect("running notification");
    assert_eq!(*states.borrow_and_update(), RunState::Running);

    harness.wait().await;
    states.changed().await.expect("final notification");
    assert_eq!(*states.borrow_and_update(), RunState::Idle);
}
