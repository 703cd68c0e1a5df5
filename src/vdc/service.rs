//! The runner `Service`: a single
//! `ClusterIP` service, named and labeled after the owning `VirtualDC`,
//! fronting the runner pod's `/status` HTTP endpoint.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use kube::api::{Api, ObjectMeta, Patch, PatchParams};
use std::collections::BTreeMap;

use crate::crds::VirtualDC;
use crate::domain::constants::{
    LABEL_OWNER, LABEL_OWNER_NAMESPACE, RUNNER_LISTEN_PORT, SERVICE_PORT, SERVICE_PORT_NAME,
};
use crate::domain::taxonomy::ServiceCreatedReason;
use crate::error::{is_conflict, Error, Result};

/// Builds the desired `Service` for `vdc`: one `status` port, selecting
/// the runner pod by owner labels. The service lands in `pod_namespace`
/// (the shared runner namespace) alongside the runner pod, not `vdc`'s
/// own namespace.
pub fn desired_service(vdc: &VirtualDC, pod_namespace: &str) -> Result<Service> {
    let name = vdc.metadata.name.as_deref().ok_or(Error::MissingObjectKey)?;
    let owner_namespace = vdc.metadata.namespace.as_deref().ok_or(Error::MissingObjectKey)?;

    let mut labels = BTreeMap::new();
    labels.insert(LABEL_OWNER.to_string(), name.to_string());
    labels.insert(LABEL_OWNER_NAMESPACE.to_string(), owner_namespace.to_string());

    Ok(Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(pod_namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels),
            ports: Some(vec![ServicePort {
                name: Some(SERVICE_PORT_NAME.to_string()),
                port: SERVICE_PORT,
                target_port: Some(
                    k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(
                        RUNNER_LISTEN_PORT as i32,
                    ),
                ),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    })
}

/// Create-or-update the `Service` for `vdc`, reporting a
/// [`ServiceCreatedReason`] instead of surfacing ownership conflicts as a
/// reconcile error.
pub async fn reconcile_service(
    api: &Api<Service>,
    vdc: &VirtualDC,
    pod_namespace: &str,
) -> Result<ServiceCreatedReason> {
    let desired = desired_service(vdc, pod_namespace)?;
    let name = desired.metadata.name.clone().ok_or(Error::MissingObjectKey)?;

    match api.get(&name).await {
        Ok(existing) => {
            if owned_by_other(&existing, vdc) {
                return Ok(ServiceCreatedReason::Conflict);
            }
            match api
                .patch(
                    &name,
                    &PatchParams::apply("vdc-operator"),
                    &Patch::Apply(&desired),
                )
                .await
            {
                Ok(_) => Ok(ServiceCreatedReason::Ok),
                Err(e) if is_conflict(&e) => Ok(ServiceCreatedReason::Conflict),
                Err(e) => Err(e.into()),
            }
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            match api.create(&Default::default(), &desired).await {
                Ok(_) => Ok(ServiceCreatedReason::Ok),
                Err(e) if is_conflict(&e) => Ok(ServiceCreatedReason::Conflict),
                Err(e) => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// `true` iff `existing`'s owner labels point at a different `VirtualDC`
/// than `vdc` — guards against stamping over a service some other
/// resource created.
fn owned_by_other(existing: &Service, vdc: &VirtualDC) -> bool {
    let want = vdc.metadata.name.as_deref().unwrap_or_default();
    existing
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(LABEL_OWNER))
        .is_some_and(|owner| owner != want)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::VirtualDcSpec;

    fn vdc_fixture(name: &str) -> VirtualDC {
        let mut vdc = VirtualDC::new(name, VirtualDcSpec {
            neco_branch: "main".to_string(),
            neco_apps_branch: "main".to_string(),
            skip_neco_apps: false,
            command: vec![],
            resources: None,
        });
        vdc.metadata.namespace = Some("default".to_string());
        vdc
    }

    #[test]
    fn desired_service_has_status_port() {
        let vdc = vdc_fixture("demo");
        let svc = desired_service(&vdc, "vdc-runner-system").unwrap();
        let ports = svc.spec.unwrap().ports.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port, SERVICE_PORT);
        assert_eq!(ports[0].name.as_deref(), Some(SERVICE_PORT_NAME));
    }

    #[test]
    fn desired_service_lands_in_the_runner_namespace_not_the_vdcs_own() {
        let vdc = vdc_fixture("demo");
        let svc = desired_service(&vdc, "vdc-runner-system").unwrap();
        assert_eq!(svc.metadata.namespace.as_deref(), Some("vdc-runner-system"));
        assert_eq!(
            svc.metadata.labels.unwrap().get(LABEL_OWNER_NAMESPACE).unwrap(),
            "default"
        );
    }

    #[test]
    fn owned_by_other_detects_foreign_owner_label() {
        let vdc = vdc_fixture("demo");
        let mut other = desired_service(&vdc_fixture("someone-else"), "vdc-runner-system").unwrap();
        other.metadata.labels.as_mut().unwrap().insert(
            LABEL_OWNER.to_string(),
            "someone-else".to_string(),
        );
        assert!(owned_by_other(&other, &vdc));
    }

    #[test]
    fn owned_by_self_is_not_a_conflict() {
        let vdc = vdc_fixture("demo");
        let svc = desired_service(&vdc, "vdc-runner-system").unwrap();
        assert!(!owned_by_other(&svc, &vdc));
    }
}
