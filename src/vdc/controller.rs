//! The `VirtualDC` reconcile loop, wrapped in
//! `kube::runtime::finalizer::finalizer` so the apply and cleanup halves
//! of one pass share a single finalizer-driven dispatch.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::api::{Api, PostParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};
use tracing::{info, instrument, warn};

use crate::context::Context;
use crate::crds::{VirtualDC, VirtualDcStatus};
use crate::domain::conditions::{self, ConditionStatus};
use crate::domain::constants::{
    DEFAULT_REQUEUE_INTERVAL_SECS, FINALIZER_NAME, LABEL_OWNER, LABEL_OWNER_NAMESPACE,
};
use crate::domain::taxonomy::{ConditionType, PodAvailableReason, PodCreatedReason};
use crate::error::{ignore_not_found, is_already_exists, Error, Result};
use crate::vdc::service;
use crate::vdc::template::{load_pod_template, stamp_pod_template};

#[instrument(skip(ctx), fields(vdc = %vdc.name_any()))]
pub async fn reconcile_vdc(vdc: Arc<VirtualDC>, ctx: Arc<Context>) -> Result<Action> {
    let ns = vdc.namespace().ok_or(Error::MissingObjectKey)?;
    let api: Api<VirtualDC> = Api::namespaced(ctx.client.clone(), &ns);

    finalizer(&api, FINALIZER_NAME, vdc, |event| async {
        match event {
            FinalizerEvent::Apply(vdc) => apply(vdc, ctx.clone()).await,
            FinalizerEvent::Cleanup(vdc) => cleanup(vdc, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

pub fn error_policy(_vdc: Arc<VirtualDC>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(%error, "vdc reconcile failed, retrying");
    Action::requeue(std::time::Duration::from_secs(DEFAULT_REQUEUE_INTERVAL_SECS))
}

/// Maps a labeled runner pod or endpoint back to the `VirtualDC` that owns
/// it, for `Controller::watches`. Ownership here is expressed with plain
/// labels, not `ownerReferences` (a label-owned object can be
/// adopted-or-rejected in a way a `kube::runtime::Controller::owns`
/// relationship can't express), so this is a `watches` mapper rather than
/// an `owns` relationship.
pub fn owner_object_ref<K>(obj: Arc<K>) -> Option<ObjectRef<VirtualDC>>
where
    K: Resource<DynamicType = ()>,
{
    let labels = obj.meta().labels.as_ref()?;
    let namespace = labels.get(LABEL_OWNER_NAMESPACE)?;
    let name = labels.get(LABEL_OWNER)?;
    Some(ObjectRef::new(name).within(namespace))
}

async fn apply(vdc: Arc<VirtualDC>, ctx: Arc<Context>) -> Result<Action> {
    let name = vdc.name_any();
    let ns = vdc.namespace().ok_or(Error::MissingObjectKey)?;
    let pod_ns = &ctx.config.pod_namespace;
    // Runner pods, the runner's Service, and the pod-template ConfigMap
    // all live in the shared runner namespace (spec.md §3/§4.4 step 5,
    // §6 `--pod-namespace`), never in the VDC's own namespace.
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), pod_ns);
    let services: Api<k8s_openapi::api::core::v1::Service> = Api::namespaced(ctx.client.clone(), pod_ns);
    let configmaps: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), pod_ns);
    let vdc_api: Api<VirtualDC> = Api::namespaced(ctx.client.clone(), &ns);

    let before = vdc.status.clone().unwrap_or_default();
    let mut status = before.clone();

    if !conditions::is_true(&status.conditions, ConditionType::PodCreated.as_str()) {
        let reason = reconcile_pod(&pods, &configmaps, &vdc, &ctx).await?;
        let (cond_status, message) = match reason {
            PodCreatedReason::Ok => (ConditionStatus::True, String::new()),
            _ => (ConditionStatus::False, format!("pod create/check: {reason}")),
        };
        conditions::set_condition(
            &mut status.conditions,
            conditions::new_condition(
                ConditionType::PodCreated.as_str(),
                cond_status,
                reason.as_str(),
                message,
            ),
        );
    }

    let (pod_available, pod_available_message) = check_pod_available(&pods, &name, &status).await;
    conditions::set_condition(
        &mut status.conditions,
        pod_available_condition(pod_available, pod_available_message),
    );

    let service_reason = service::reconcile_service(&services, &vdc, pod_ns).await?;
    let (svc_status, svc_message) = match service_reason {
        crate::domain::taxonomy::ServiceCreatedReason::Ok => (ConditionStatus::True, String::new()),
        _ => (ConditionStatus::False, format!("service reconcile: {service_reason}")),
    };
    conditions::set_condition(
        &mut status.conditions,
        conditions::new_condition(
            ConditionType::ServiceCreated.as_str(),
            svc_status,
            service_reason.as_str(),
            svc_message,
        ),
    );

    let status_url = format!("http://{name}.{pod_ns}.svc/status");
    ctx.job_manager
        .start(&ns, &name, status_url, vdc_api.clone())
        .await;

    if !conditions::semantically_equal(&before.conditions, &status.conditions) {
        patch_status(&vdc_api, &name, status).await?;
    }

    Ok(Action::requeue(requeue_interval(&ctx)))
}

fn requeue_interval(ctx: &Context) -> std::time::Duration {
    ctx.config
        .requeue_interval_duration()
        .unwrap_or(std::time::Duration::from_secs(DEFAULT_REQUEUE_INTERVAL_SECS))
}

async fn cleanup(vdc: Arc<VirtualDC>, ctx: Arc<Context>) -> Result<Action> {
    let name = vdc.name_any();
    let ns = vdc.namespace().ok_or(Error::MissingObjectKey)?;

    ctx.job_manager.stop(&ns, &name).await;

    let pod_ns = &ctx.config.pod_namespace;
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), pod_ns);
    let services: Api<k8s_openapi::api::core::v1::Service> = Api::namespaced(ctx.client.clone(), pod_ns);

    delete_if_owned(&pods, &name).await?;
    delete_if_owned(&services, &name).await?;

    info!("vdc cleanup complete");
    Ok(Action::await_change())
}

async fn delete_if_owned<K>(api: &Api<K>, name: &str) -> Result<()>
where
    K: kube::Resource<DynamicType = ()> + Clone + std::fmt::Debug + for<'de> serde::Deserialize<'de>,
{
    match api.get(name).await {
        Ok(existing) => {
            let owned = existing.labels().get(LABEL_OWNER).is_some_and(|o| o == name);
            if owned {
                api.delete(name, &Default::default())
                    .await
                    .map(|_| ())
                    .or_else(ignore_not_found)?;
            }
            Ok(())
        }
        Err(e) => ignore_not_found(e),
    }
}

async fn reconcile_pod(
    pods: &Api<Pod>,
    configmaps: &Api<ConfigMap>,
    vdc: &VirtualDC,
    ctx: &Context,
) -> Result<PodCreatedReason> {
    let name = vdc.name_any();

    let cm = match configmaps.get(&ctx.config.pod_template_configmap).await {
        Ok(cm) => cm,
        Err(e) => {
            warn!(error = %e, "failed to load pod template configmap");
            return Ok(PodCreatedReason::Failed);
        }
    };

    let template = match load_pod_template(&cm)
        .and_then(|t| stamp_pod_template(t, vdc, &ctx.config.pod_namespace))
    {
        Ok(t) => t,
        Err(Error::TemplateError(msg)) => {
            warn!(%msg, "pod template invalid");
            return Ok(PodCreatedReason::TemplateError);
        }
        Err(e) => return Err(e),
    };

    let pod = Pod {
        metadata: template.metadata.unwrap_or_default(),
        spec: template.spec,
        status: None,
    };

    match pods.create(&PostParams::default(), &pod).await {
        Ok(_) => Ok(PodCreatedReason::Ok),
        Err(e) if is_already_exists(&e) => match pods.get(&name).await {
            Ok(existing) => {
                let matches = existing
                    .metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get(LABEL_OWNER_NAMESPACE))
                    .is_some_and(|ns| Some(ns.as_str()) == vdc.namespace().as_deref());
                if matches {
                    Ok(PodCreatedReason::Ok)
                } else {
                    Ok(PodCreatedReason::Conflict)
                }
            }
            Err(_) => Ok(PodCreatedReason::Failed),
        },
        Err(_) => Ok(PodCreatedReason::Failed),
    }
}

/// Determines `PodAvailable`, keying off the pod's own `PodScheduled`/
/// `Ready` conditions rather than `.status.phase` so "not yet scheduled"
/// and "scheduled but not ready" stay distinct, the way the original
/// (`virtualdc_controller.go`) reads `corev1.PodScheduled`/`corev1.PodReady`
/// rather than the coarser phase string. Returns the reason plus a
/// message surfacing the conflicting owner or the pod condition's own
/// message, so `PodAvailable=False` isn't silently blank.
async fn check_pod_available(
    pods: &Api<Pod>,
    name: &str,
    status: &VirtualDcStatus,
) -> (PodAvailableReason, String) {
    if !conditions::is_true(&status.conditions, ConditionType::PodCreated.as_str()) {
        return (PodAvailableReason::NotExists, String::new());
    }

    let pod = match pods.get(name).await {
        Ok(pod) => pod,
        Err(_) => return (PodAvailableReason::NotExists, String::new()),
    };

    let owner_matches = pod
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(LABEL_OWNER))
        .is_some_and(|o| o == name);
    if !owner_matches {
        return (
            PodAvailableReason::NotAvailable,
            format!("pod {name:?} is owned by a different VirtualDC"),
        );
    }

    let Some(pod_conditions) = pod.status.as_ref().and_then(|s| s.conditions.as_ref()) else {
        return (PodAvailableReason::NotScheduled, String::new());
    };

    let scheduled = pod_conditions.iter().find(|c| c.type_ == "PodScheduled");
    if !scheduled.is_some_and(|c| c.status == "True") {
        let message = scheduled.and_then(|c| c.message.clone()).unwrap_or_default();
        return (PodAvailableReason::NotScheduled, message);
    }

    let ready = pod_conditions.iter().find(|c| c.type_ == "Ready");
    if ready.is_some_and(|c| c.status == "True") {
        (PodAvailableReason::Ok, String::new())
    } else {
        let message = ready.and_then(|c| c.message.clone()).unwrap_or_default();
        (PodAvailableReason::NotAvailable, message)
    }
}

fn pod_available_condition(
    reason: PodAvailableReason,
    message: String,
) -> k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition {
    let status = match reason {
        PodAvailableReason::Ok => ConditionStatus::True,
        _ => ConditionStatus::False,
    };
    conditions::new_condition(
        ConditionType::PodAvailable.as_str(),
        status,
        reason.as_str(),
        message,
    )
}

async fn patch_status(api: &Api<VirtualDC>, name: &str, status: VirtualDcStatus) -> Result<()> {
    let mut current = api.get(name).await?;
    current.status = Some(status);
    api.replace_status(name, &PostParams::default(), serde_json::to_vec(&current)?)
        .await?;
    Ok(())
}
