//! Tests for the background cache purge task.
//!
//! These tests verify:
//! - The task is disabled when the interval is 0
//! - Entries older than the maximum age are evicted on schedule
//! - Fresh entries survive a sweep
//! - A panicking sweep does not stop later sweeps

mod common;

use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voxhook_server::background::{purge_all, run_purge_loop, start_purge_task};
use voxhook_server::config::ApplicationConfig;
use voxhook_server::{app, RuntimeSettings, ServerContext};

fn setup() -> (Arc<ServerContext>, axum::Router) {
    let (context, _worker) = ServerContext::builder(RuntimeSettings::default())
        .application(test_application(ApplicationConfig::default()))
        .build()
        .expect("context should build");
    (context.clone(), app(context))
}

#[tokio::test]
async fn test_purge_task_disabled_when_interval_zero() {
    let (context, _app) = setup();

    let handle = tokio::spawn(start_purge_task(
        context,
        Duration::ZERO,
        Duration::from_secs(60),
    ));

    let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
    assert!(
        result.is_ok(),
        "purge task with interval=0 should return immediately"
    );
}

#[tokio::test(start_paused = true)]
async fn test_purge_task_evicts_expired_entries() {
    let (context, app) = setup();
    post_json(&app, "/vapi", &assistant_request("old")).await;

    let task = tokio::spawn(start_purge_task(
        context.clone(),
        Duration::from_secs(60),
        Duration::from_secs(90),
    ));

    // First sweep at t=60s: the entry is 60s old and survives.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(application(&context).tool_cache().len(), 1);

    post_json(&app, "/vapi", &assistant_request("new")).await;

    // Second sweep at t=120s: "old" is 120s old, "new" is 59s old.
    tokio::time::sleep(Duration::from_secs(60)).await;
    let app_state = application(&context);
    assert_eq!(app_state.tool_cache().len(), 1);
    assert_eq!(app_state.function_cache().len(), 1);
    assert!(app_state.tool_cache().last_purge().is_some());

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_purge_all_counts_every_cache() {
    let (context, app) = setup();
    post_json(&app, "/vapi", &assistant_request("S1")).await;
    post_json(&app, "/vapi", &assistant_request("S2")).await;

    assert_eq!(purge_all(&context, Duration::from_secs(10)), 0);

    tokio::time::advance(Duration::from_secs(11)).await;
    // Two sessions, each with a tool-call and a function entry.
    assert_eq!(purge_all(&context, Duration::from_secs(10)), 4);
    assert!(application(&context).tool_cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_purge_loop_survives_panicking_sweep() {
    let sweeps = Arc::new(AtomicUsize::new(0));
    let counter = sweeps.clone();

    let task = tokio::spawn(run_purge_loop(Duration::from_secs(30), move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("cache lock poisoned");
        }
        0
    }));

    // First sweep at t=30s panics.
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(sweeps.load(Ordering::SeqCst), 1);
    assert!(!task.is_finished(), "loop should outlive a failed sweep");

    // Second sweep at t=60s still runs.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(sweeps.load(Ordering::SeqCst), 2);
    assert!(!task.is_finished());

    task.abort();
}
