//! End-to-end scheduled-window scenarios for the `AutoVirtualDC` state
//! machine, driving the same `decide` entry point the reconciler calls
//! without a cluster.

use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use vdc_operator::avdc::controller::{decide, ChildAction, ChildView, Requeue};
use vdc_operator::crds::{AutoVirtualDcSpec, AutoVirtualDcStatus, VirtualDcSpec};
use vdc_operator::domain::taxonomy::JobCompletedReason;

fn ts(s: &str) -> chrono::DateTime<chrono::Utc> {
    s.parse().unwrap()
}

fn scheduled_spec(timeout: &str) -> AutoVirtualDcSpec {
    AutoVirtualDcSpec {
        template: VirtualDcSpec {
            neco_branch: "main".to_string(),
            neco_apps_branch: "main".to_string(),
            skip_neco_apps: false,
            command: vec![],
            resources: None,
        },
        start_schedule: "0 0 0 * * *".to_string(),
        stop_schedule: "0 0 12 * * *".to_string(),
        timeout_duration: timeout.to_string(),
    }
}

fn window_status(start: &str, stop: &str) -> AutoVirtualDcStatus {
    AutoVirtualDcStatus {
        next_start_time: Some(Time(ts(start))),
        next_stop_time: Some(Time(ts(stop))),
    }
}

#[test]
fn first_pass_computes_the_window_and_requeues_almost_immediately() {
    let decision = decide(
        ts("2025-12-31T23:00:00Z"),
        &scheduled_spec(""),
        &AutoVirtualDcStatus::default(),
        None,
        Duration::from_secs(60),
    );

    assert_eq!(decision.child_action, ChildAction::None);
    assert!(decision.status.next_start_time.is_some());
    assert!(decision.status.next_stop_time.is_some());
    assert_eq!(decision.requeue, Requeue::After(Duration::from_secs(1)));
}

#[test]
fn before_the_window_opens_no_child_is_created_and_requeue_targets_the_start_time() {
    let next_start = ts("2026-01-01T00:00:00Z");
    let status = window_status("2026-01-01T00:00:00Z", "2026-01-01T12:00:00Z");

    let decision = decide(
        ts("2025-12-31T22:00:00Z"),
        &scheduled_spec(""),
        &status,
        None,
        Duration::from_secs(60),
    );

    assert_eq!(decision.child_action, ChildAction::None);
    assert_eq!(decision.requeue, Requeue::At(next_start));
}

#[test]
fn inside_the_window_with_no_child_yet_the_child_is_ensured() {
    let status = window_status("2026-01-01T00:00:00Z", "2026-01-01T12:00:00Z");

    let decision = decide(
        ts("2026-01-01T01:00:00Z"),
        &scheduled_spec(""),
        &status,
        None,
        Duration::from_secs(60),
    );

    assert_eq!(decision.child_action, ChildAction::Ensure);
    assert_eq!(decision.requeue, Requeue::After(Duration::from_secs(60)));
}

#[test]
fn inside_the_window_a_completed_job_rolls_the_window_forward_immediately() {
    let status = window_status("2026-01-01T00:00:00Z", "2026-01-01T12:00:00Z");
    let child = ChildView {
        creation_timestamp: ts("2026-01-01T00:00:05Z"),
        job_completed_reason: Some(JobCompletedReason::Ok),
    };

    let decision = decide(
        ts("2026-01-01T00:05:00Z"),
        &scheduled_spec(""),
        &status,
        Some(&child),
        Duration::from_secs(60),
    );

    assert_eq!(decision.child_action, ChildAction::None);
    // The window is recomputed from `now`, not left at the one that just closed.
    assert_ne!(decision.status.next_start_time.unwrap().0, ts("2026-01-01T00:00:00Z"));
    assert_eq!(decision.requeue, Requeue::After(Duration::from_secs(1)));
}

#[test]
fn repeated_failures_inside_the_window_retry_until_the_timeout_then_wait_for_the_stop_time() {
    let status = window_status("2026-01-01T00:00:00Z", "2026-01-01T12:00:00Z");
    let child = ChildView {
        creation_timestamp: ts("2026-01-01T00:00:05Z"),
        job_completed_reason: Some(JobCompletedReason::Failed),
    };

    let still_retrying = decide(
        ts("2026-01-01T00:10:00Z"),
        &scheduled_spec("30m"),
        &status,
        Some(&child),
        Duration::from_secs(60),
    );
    assert_eq!(still_retrying.child_action, ChildAction::Delete);
    assert_eq!(still_retrying.requeue, Requeue::After(Duration::from_secs(60)));

    let timed_out = decide(
        ts("2026-01-01T01:00:00Z"),
        &scheduled_spec("30m"),
        &status,
        Some(&child),
        Duration::from_secs(60),
    );
    assert_eq!(timed_out.child_action, ChildAction::None);
    assert_eq!(timed_out.requeue, Requeue::At(ts("2026-01-01T12:00:00Z")));
}

#[test]
fn reaching_the_stop_time_closes_the_window_and_deletes_the_child() {
    let status = window_status("2026-01-01T00:00:00Z", "2026-01-01T12:00:00Z");
    let child = ChildView {
        creation_timestamp: ts("2026-01-01T00:00:05Z"),
        job_completed_reason: Some(JobCompletedReason::Running),
    };

    let decision = decide(
        ts("2026-01-01T12:00:00Z"),
        &scheduled_spec(""),
        &status,
        Some(&child),
        Duration::from_secs(60),
    );

    assert_eq!(decision.child_action, ChildAction::Delete);
    assert_ne!(decision.status.next_start_time.unwrap().0, ts("2026-01-01T00:00:00Z"));
    assert_eq!(decision.requeue, Requeue::After(Duration::from_secs(60)));
}
