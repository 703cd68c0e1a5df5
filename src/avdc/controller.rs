//! The AVDC state machine, split into a pure [`decide`]
//! function (unit-tested against a [`crate::domain::FakeClock`]) and a thin
//! async wrapper that executes the decision against the cluster.
//!
//! OQ1 (timeout anchor) and OQ3 (closed reason enum) are resolved here; see
//! DESIGN.md.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::{Resource, ResourceExt};
use tracing::{info, instrument, warn};

use crate::context::Context;
use crate::crds::{AutoVirtualDC, AutoVirtualDcStatus, VirtualDC};
use crate::domain::constants::FINALIZER_NAME;
use crate::domain::taxonomy::{ConditionType, JobCompletedReason};
use crate::error::{ignore_not_found, Error, Result};

use super::schedule;

/// What the async wrapper should do to the child VDC this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildAction {
    None,
    Ensure,
    Delete,
}

/// When the next reconcile pass should fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    After(Duration),
    At(DateTime<Utc>),
    Never,
}

/// The result of evaluating one AVDC pass against a snapshot of the world.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub child_action: ChildAction,
    pub status: AutoVirtualDcStatus,
    pub requeue: Requeue,
}

/// What the decision function needs to know about the (possibly absent)
/// child VDC.
#[derive(Debug, Clone)]
pub struct ChildView {
    pub creation_timestamp: DateTime<Utc>,
    pub job_completed_reason: Option<JobCompletedReason>,
}

const ONE_SECOND: Duration = Duration::from_secs(1);

/// Pure AVDC state transition. `requeue_interval` is the
/// operator-wide default requeue cadence (`--requeue-interval`).
pub fn decide(
    now: DateTime<Utc>,
    spec: &crate::crds::AutoVirtualDcSpec,
    status: &AutoVirtualDcStatus,
    child: Option<&ChildView>,
    requeue_interval: Duration,
) -> Decision {
    let timeout = if spec.timeout_duration.is_empty() {
        None
    } else {
        schedule::parse_duration(&spec.timeout_duration).ok()
    };

    let scheduled = !spec.start_schedule.is_empty() && !spec.stop_schedule.is_empty();

    if !scheduled {
        return decide_unscheduled(now, timeout, child, requeue_interval, status.clone());
    }

    decide_scheduled(now, spec, status, child, timeout, requeue_interval)
}

fn decide_unscheduled(
    now: DateTime<Utc>,
    timeout: Option<Duration>,
    child: Option<&ChildView>,
    requeue_interval: Duration,
    status: AutoVirtualDcStatus,
) -> Decision {
    let Some(child) = child else {
        return Decision {
            child_action: ChildAction::Ensure,
            status,
            requeue: Requeue::After(requeue_interval),
        };
    };

    match child.job_completed_reason {
        None | Some(JobCompletedReason::Pending) | Some(JobCompletedReason::Running) => Decision {
            child_action: ChildAction::None,
            status,
            requeue: Requeue::After(requeue_interval),
        },
        Some(JobCompletedReason::Ok) => Decision {
            child_action: ChildAction::None,
            status,
            requeue: Requeue::Never,
        },
        Some(JobCompletedReason::Failed) => {
            // OQ1: unscheduled case anchors the timeout on the child's own
            // creation time, not on any schedule-derived timestamp.
            if timed_out(now, child.creation_timestamp, timeout) {
                Decision {
                    child_action: ChildAction::None,
                    status,
                    requeue: Requeue::Never,
                }
            } else {
                Decision {
                    child_action: ChildAction::Delete,
                    status,
                    requeue: Requeue::After(requeue_interval),
                }
            }
        }
    }
}

fn decide_scheduled(
    now: DateTime<Utc>,
    spec: &crate::crds::AutoVirtualDcSpec,
    status: &AutoVirtualDcStatus,
    child: Option<&ChildView>,
    timeout: Option<Duration>,
    requeue_interval: Duration,
) -> Decision {
    // Step 1: (re)compute missing next_start_time/next_stop_time.
    if status.next_start_time.is_none() || status.next_stop_time.is_none() {
        let (mut next_start, next_stop) = compute_window(spec, now);
        if next_stop < next_start {
            next_start = now;
        }
        return Decision {
            child_action: ChildAction::None,
            status: AutoVirtualDcStatus {
                next_start_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(next_start)),
                next_stop_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(next_stop)),
            },
            requeue: Requeue::After(ONE_SECOND),
        };
    }

    let next_start = status.next_start_time.as_ref().unwrap().0;
    let next_stop = status.next_stop_time.as_ref().unwrap().0;

    // Step 2: before the window opens.
    if now < next_start && now < next_stop {
        return Decision {
            child_action: ChildAction::None,
            status: status.clone(),
            requeue: Requeue::At(next_start.min(next_stop)),
        };
    }

    // Step 3: inside the active window.
    if next_start <= now && now < next_stop {
        return decide_inside_window(now, child, timeout, requeue_interval, next_start, next_stop, spec);
    }

    // Step 4: now >= next_stop_time — close the window.
    let (next_start, next_stop) = compute_window(spec, now);
    Decision {
        child_action: ChildAction::Delete,
        status: AutoVirtualDcStatus {
            next_start_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(next_start)),
            next_stop_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(next_stop)),
        },
        requeue: Requeue::After(requeue_interval),
    }
}

#[allow(clippy::too_many_arguments)]
fn decide_inside_window(
    now: DateTime<Utc>,
    child: Option<&ChildView>,
    timeout: Option<Duration>,
    requeue_interval: Duration,
    next_start: DateTime<Utc>,
    next_stop: DateTime<Utc>,
    spec: &crate::crds::AutoVirtualDcSpec,
) -> Decision {
    let status_same_window = AutoVirtualDcStatus {
        next_start_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(next_start)),
        next_stop_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(next_stop)),
    };

    let Some(child) = child else {
        return Decision {
            child_action: ChildAction::Ensure,
            status: status_same_window,
            requeue: Requeue::After(requeue_interval),
        };
    };

    match child.job_completed_reason {
        None | Some(JobCompletedReason::Pending) | Some(JobCompletedReason::Running) => Decision {
            child_action: ChildAction::None,
            status: status_same_window,
            requeue: Requeue::After(requeue_interval),
        },
        Some(JobCompletedReason::Ok) => {
            let (next_start, next_stop) = compute_window(spec, now);
            Decision {
                child_action: ChildAction::None,
                status: AutoVirtualDcStatus {
                    next_start_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(next_start)),
                    next_stop_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(next_stop)),
                },
                requeue: Requeue::After(ONE_SECOND),
            }
        }
        Some(JobCompletedReason::Failed) => {
            if timed_out(now, next_start, timeout) {
                Decision {
                    child_action: ChildAction::None,
                    status: status_same_window,
                    requeue: Requeue::At(next_stop),
                }
            } else {
                Decision {
                    child_action: ChildAction::Delete,
                    status: status_same_window,
                    requeue: Requeue::After(requeue_interval),
                }
            }
        }
    }
}

fn timed_out(now: DateTime<Utc>, anchor: DateTime<Utc>, timeout: Option<Duration>) -> bool {
    match timeout {
        None => false,
        Some(timeout) => match chrono::Duration::from_std(timeout) {
            Ok(d) => now > anchor + d,
            Err(_) => false,
        },
    }
}

fn compute_window(
    spec: &crate::crds::AutoVirtualDcSpec,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = schedule::next_fire(&spec.start_schedule, now).unwrap_or(now);
    let stop = schedule::next_fire(&spec.stop_schedule, now).unwrap_or(now);
    (start, stop)
}

#[instrument(skip(ctx), fields(avdc = %avdc.name_any()))]
pub async fn reconcile_avdc(avdc: Arc<AutoVirtualDC>, ctx: Arc<Context>) -> Result<Action> {
    let ns = avdc.namespace().ok_or(Error::MissingObjectKey)?;
    let api: Api<AutoVirtualDC> = Api::namespaced(ctx.client.clone(), &ns);

    finalizer(&api, FINALIZER_NAME, avdc, |event| async {
        match event {
            FinalizerEvent::Apply(avdc) => apply(avdc, ctx.clone()).await,
            FinalizerEvent::Cleanup(avdc) => cleanup(avdc, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

pub fn error_policy(_avdc: Arc<AutoVirtualDC>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(%error, "avdc reconcile failed, retrying");
    Action::requeue(Duration::from_secs(
        crate::domain::constants::DEFAULT_REQUEUE_INTERVAL_SECS,
    ))
}

async fn apply(avdc: Arc<AutoVirtualDC>, ctx: Arc<Context>) -> Result<Action> {
    let name = avdc.name_any();
    let ns = avdc.namespace().ok_or(Error::MissingObjectKey)?;
    let vdc_api: Api<VirtualDC> = Api::namespaced(ctx.client.clone(), &ns);

    let child_view = match vdc_api.get(&name).await {
        Ok(vdc) => Some(ChildView {
            creation_timestamp: vdc
                .meta()
                .creation_timestamp
                .clone()
                .map(|t| t.0)
                .unwrap_or_else(|| ctx.clock.now()),
            job_completed_reason: job_completed_reason(&vdc),
        }),
        Err(kube::Error::Api(ae)) if ae.code == 404 => None,
        Err(e) => return Err(e.into()),
    };

    let requeue_interval = ctx
        .config
        .requeue_interval_duration()
        .unwrap_or(Duration::from_secs(
            crate::domain::constants::DEFAULT_REQUEUE_INTERVAL_SECS,
        ));

    let decision = decide(
        ctx.clock.now(),
        &avdc.spec,
        avdc.status.as_ref().unwrap_or(&AutoVirtualDcStatus::default()),
        child_view.as_ref(),
        requeue_interval,
    );

    match decision.child_action {
        ChildAction::None => {}
        ChildAction::Ensure => ensure_child(&vdc_api, &avdc).await?,
        ChildAction::Delete => {
            vdc_api
                .delete(&name, &DeleteParams::default())
                .await
                .map(|_| ())
                .or_else(ignore_not_found)?;
        }
    }

    if avdc.status.as_ref() != Some(&decision.status) {
        let api: Api<AutoVirtualDC> = Api::namespaced(ctx.client.clone(), &ns);
        let mut current = api.get(&name).await?;
        current.status = Some(decision.status.clone());
        api.replace_status(&name, &PostParams::default(), serde_json::to_vec(&current)?)
            .await?;
    }

    Ok(match decision.requeue {
        Requeue::After(d) => Action::requeue(d),
        Requeue::At(t) => {
            let delta = (t - ctx.clock.now()).to_std().unwrap_or(Duration::from_secs(1));
            Action::requeue(delta)
        }
        Requeue::Never => Action::await_change(),
    })
}

async fn cleanup(avdc: Arc<AutoVirtualDC>, _ctx: Arc<Context>) -> Result<Action> {
    let name = avdc.name_any();
    info!(%name, "avdc cleanup: child VDC is garbage-collected via owner reference");
    Ok(Action::await_change())
}

async fn ensure_child(vdc_api: &Api<VirtualDC>, avdc: &AutoVirtualDC) -> Result<()> {
    let name = avdc.name_any();
    if vdc_api.get(&name).await.is_ok() {
        return Ok(());
    }

    let owner_ref = avdc.controller_owner_ref(&()).ok_or(Error::MissingObjectKey)?;
    let mut child: VirtualDC = VirtualDC::new(&name, avdc.spec.template.clone());
    child.metadata = ObjectMeta {
        name: Some(name.clone()),
        namespace: avdc.namespace(),
        owner_references: Some(vec![owner_ref]),
        ..Default::default()
    };

    match vdc_api.create(&PostParams::default(), &child).await {
        Ok(_) => Ok(()),
        Err(e) if crate::error::is_already_exists(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn job_completed_reason(vdc: &VirtualDC) -> Option<JobCompletedReason> {
    let status = vdc.status.as_ref()?;
    let condition = status
        .conditions
        .iter()
        .find(|c| c.type_ == ConditionType::PodJobCompleted.as_str())?;
    match condition.reason.as_str() {
        "OK" => Some(JobCompletedReason::Ok),
        "Failed" => Some(JobCompletedReason::Failed),
        "Pending" => Some(JobCompletedReason::Pending),
        "Running" => Some(JobCompletedReason::Running),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::VirtualDcSpec;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn spec_unscheduled(timeout: &str) -> crate::crds::AutoVirtualDcSpec {
        crate::crds::AutoVirtualDcSpec {
            template: VirtualDcSpec {
                neco_branch: "main".to_string(),
                neco_apps_branch: "main".to_string(),
                skip_neco_apps: false,
                command: vec![],
                resources: None,
            },
            start_schedule: String::new(),
            stop_schedule: String::new(),
            timeout_duration: timeout.to_string(),
        }
    }

    #[test]
    fn case_a_creates_child_when_absent() {
        let d = decide(
            ts("2026-01-01T00:00:00Z"),
            &spec_unscheduled(""),
            &AutoVirtualDcStatus::default(),
            None,
            Duration::from_secs(60),
        );
        assert_eq!(d.child_action, ChildAction::Ensure);
        assert_eq!(d.requeue, Requeue::After(Duration::from_secs(60)));
    }

    #[test]
    fn case_a_stops_when_child_ok() {
        let child = ChildView {
            creation_timestamp: ts("2026-01-01T00:00:00Z"),
            job_completed_reason: Some(JobCompletedReason::Ok),
        };
        let d = decide(
            ts("2026-01-01T00:10:00Z"),
            &spec_unscheduled(""),
            &AutoVirtualDcStatus::default(),
            Some(&child),
            Duration::from_secs(60),
        );
        assert_eq!(d.child_action, ChildAction::None);
        assert_eq!(d.requeue, Requeue::Never);
    }

    #[test]
    fn timeout_from_creation_no_schedule() {
        let child = ChildView {
            creation_timestamp: ts("2026-01-01T00:00:00Z"),
            job_completed_reason: Some(JobCompletedReason::Failed),
        };
        // OQ1: unscheduled timeout anchors on the child's own creation time.
        let within = decide(
            ts("2026-01-01T00:30:00Z"),
            &spec_unscheduled("1h"),
            &AutoVirtualDcStatus::default(),
            Some(&child),
            Duration::from_secs(60),
        );
        assert_eq!(within.child_action, ChildAction::Delete);

        let past = decide(
            ts("2026-01-01T02:00:00Z"),
            &spec_unscheduled("1h"),
            &AutoVirtualDcStatus::default(),
            Some(&child),
            Duration::from_secs(60),
        );
        assert_eq!(past.child_action, ChildAction::None);
        assert_eq!(past.requeue, Requeue::Never);
    }

    #[test]
    fn timeout_from_next_start_time_scheduled() {
        let spec = crate::crds::AutoVirtualDcSpec {
            template: VirtualDcSpec {
                neco_branch: "main".to_string(),
                neco_apps_branch: "main".to_string(),
                skip_neco_apps: false,
                command: vec![],
                resources: None,
            },
            start_schedule: "0 0 0 * * *".to_string(),
            stop_schedule: "0 0 12 * * *".to_string(),
            timeout_duration: "1h".to_string(),
        };
        let next_start = ts("2026-01-01T00:00:00Z");
        let next_stop = ts("2026-01-01T12:00:00Z");
        let status = AutoVirtualDcStatus {
            next_start_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(next_start)),
            next_stop_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(next_stop)),
        };
        // Child created well before next_start_time; if the timeout anchored on
        // creation time (wrong for Case B) this would already show "timed out".
        let child = ChildView {
            creation_timestamp: ts("2025-06-01T00:00:00Z"),
            job_completed_reason: Some(JobCompletedReason::Failed),
        };

        let d = decide(
            ts("2026-01-01T00:30:00Z"),
            &spec,
            &status,
            Some(&child),
            Duration::from_secs(60),
        );
        assert_eq!(d.child_action, ChildAction::Delete, "not yet timed out from next_start_time");

        let d2 = decide(
            ts("2026-01-01T02:00:00Z"),
            &spec,
            &status,
            Some(&child),
            Duration::from_secs(60),
        );
        assert_eq!(d2.child_action, ChildAction::None);
        assert_eq!(d2.requeue, Requeue::At(next_stop));
    }

    #[test]
    fn avdc_never_observes_service_created_reason() {
        // OQ3: job_completed_reason only ever parses the PodJobCompleted
        // taxonomy's own reasons; a ServiceCreated-only reason string like
        // "Conflict" on a *different* condition type never reaches this
        // match because `job_completed_reason` first filters by
        // `ConditionType::PodJobCompleted`, and unrecognized strings for
        // that condition type fall through to `None`.
        let mut vdc = VirtualDC::new(
            "x",
            VirtualDcSpec {
                neco_branch: "main".to_string(),
                neco_apps_branch: "main".to_string(),
                skip_neco_apps: false,
                command: vec![],
                resources: None,
            },
        );
        vdc.status = Some(crate::crds::VirtualDcStatus {
            conditions: vec![crate::domain::conditions::new_condition(
                ConditionType::PodJobCompleted.as_str(),
                crate::domain::conditions::ConditionStatus::False,
                "Conflict",
                "",
            )],
        });
        assert_eq!(job_completed_reason(&vdc), None);
    }
}
