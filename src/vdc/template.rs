//! Loads and stamps the runner pod template.
//!
//! The template itself lives in a `ConfigMap` the controller reads fresh
//! on every reconcile rather than once at startup, so an operator can
//! edit the `ConfigMap` in place and have it pick up on the next pass.

use k8s_openapi::api::core::v1::{ConfigMap, EnvVar, PodTemplateSpec};
use kube::api::ObjectMeta;

use crate::crds::VirtualDC;
use crate::domain::constants::{LABEL_OWNER, LABEL_OWNER_NAMESPACE, POD_TEMPLATE_CONFIGMAP_KEY};
use crate::error::{Error, Result};

/// Parses the pod template out of `cm`'s `pod-template` key, rejecting a
/// spec with zero containers.
pub fn load_pod_template(cm: &ConfigMap) -> Result<PodTemplateSpec> {
    let raw = cm
        .data
        .as_ref()
        .and_then(|d| d.get(POD_TEMPLATE_CONFIGMAP_KEY))
        .ok_or_else(|| {
            Error::TemplateError(format!(
                "ConfigMap {:?} has no {POD_TEMPLATE_CONFIGMAP_KEY:?} key",
                cm.metadata.name
            ))
        })?;

    let template: PodTemplateSpec = serde_yaml::from_str(raw)?;
    let container_count = template
        .spec
        .as_ref()
        .map(|s| s.containers.len())
        .unwrap_or(0);
    if container_count == 0 {
        return Err(Error::TemplateError(
            "pod template must have at least one container".to_string(),
        ));
    }
    Ok(template)
}

/// Stamps a loaded pod template with this `VirtualDC`'s identity: name,
/// owner labels, bootstrap env vars, and the runner's argv. The pod
/// itself lands in `pod_namespace` (the shared runner namespace, spec.md
/// §3/§6), not the `VirtualDC`'s own namespace — only the owner labels
/// carry the VDC's namespace/name.
pub fn stamp_pod_template(
    mut template: PodTemplateSpec,
    vdc: &VirtualDC,
    pod_namespace: &str,
) -> Result<PodTemplateSpec> {
    let name = vdc.metadata.name.as_deref().ok_or(Error::MissingObjectKey)?;
    let owner_namespace = vdc.metadata.namespace.as_deref().ok_or(Error::MissingObjectKey)?;

    let mut meta = template.metadata.take().unwrap_or_default();
    meta.name = Some(name.to_string());
    meta.namespace = Some(pod_namespace.to_string());
    let mut labels = meta.labels.unwrap_or_default();
    labels.insert(LABEL_OWNER.to_string(), name.to_string());
    labels.insert(LABEL_OWNER_NAMESPACE.to_string(), owner_namespace.to_string());
    meta.labels = Some(labels);
    template.metadata = Some(meta);

    let mut spec = template.spec.take().ok_or_else(|| {
        Error::TemplateError("pod template is missing .spec after validation".to_string())
    })?;

    let container = spec
        .containers
        .first_mut()
        .ok_or_else(|| Error::TemplateError("pod template has no containers".to_string()))?;

    let mut env = container.env.take().unwrap_or_default();
    env.push(EnvVar {
        name: "NECO_BRANCH".to_string(),
        value: Some(vdc.spec.neco_branch.clone()),
        value_from: None,
    });
    if !vdc.spec.skip_neco_apps {
        env.push(EnvVar {
            name: "NECO_APPS_BRANCH".to_string(),
            value: Some(vdc.spec.neco_apps_branch.clone()),
            value_from: None,
        });
    }
    container.env = Some(env);

    let mut args = container.args.take().unwrap_or_default();
    args.push("neco_bootstrap:/scripts/neco-bootstrap".to_string());
    if !vdc.spec.skip_neco_apps {
        args.push("neco_apps_bootstrap:/scripts/neco-apps-bootstrap".to_string());
    }
    if !vdc.spec.command.is_empty() {
        args.push(format!("user_defined_command:{}", vdc.spec.command.join(" ")));
    }
    container.args = Some(args);

    template.spec = Some(spec);
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::VirtualDcSpec;
    use k8s_openapi::api::core::v1::Container;
    use std::collections::BTreeMap;

    fn base_template() -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: Some(ObjectMeta::default()),
            spec: Some(k8s_openapi::api::core::v1::PodSpec {
                containers: vec![Container {
                    name: "runner".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
        }
    }

    fn vdc_fixture(name: &str, skip_neco_apps: bool, command: Vec<String>) -> VirtualDC {
        let mut vdc = VirtualDC::new(
            name,
            VirtualDcSpec {
                neco_branch: "main".to_string(),
                neco_apps_branch: "main".to_string(),
                skip_neco_apps,
                command,
                resources: None,
            },
        );
        vdc.metadata.namespace = Some("default".to_string());
        vdc
    }

    #[test]
    fn load_rejects_missing_key() {
        let cm = ConfigMap {
            data: Some(BTreeMap::new()),
            ..Default::default()
        };
        assert!(load_pod_template(&cm).is_err());
    }

    #[test]
    fn load_rejects_zero_containers() {
        let yaml = "spec:\n  containers: []\n";
        let mut data = BTreeMap::new();
        data.insert(POD_TEMPLATE_CONFIGMAP_KEY.to_string(), yaml.to_string());
        let cm = ConfigMap {
            data: Some(data),
            ..Default::default()
        };
        assert!(load_pod_template(&cm).is_err());
    }

    #[test]
    fn stamp_places_pod_in_the_runner_namespace_not_the_vdcs_own() {
        let vdc = vdc_fixture("demo", false, vec![]);
        let stamped = stamp_pod_template(base_template(), &vdc, "vdc-runner-system").unwrap();
        let meta = stamped.metadata.unwrap();
        assert_eq!(meta.namespace.as_deref(), Some("vdc-runner-system"));
        let labels = meta.labels.unwrap();
        assert_eq!(labels.get(LABEL_OWNER_NAMESPACE).unwrap(), "default");
    }

    #[test]
    fn stamp_sets_owner_labels_and_neco_branch_env() {
        let vdc = vdc_fixture("demo", false, vec![]);
        let stamped = stamp_pod_template(base_template(), &vdc, "vdc-runner-system").unwrap();
        let labels = stamped.metadata.unwrap().labels.unwrap();
        assert_eq!(labels.get(LABEL_OWNER).unwrap(), "demo");

        let spec = stamped.spec.unwrap();
        let env = spec.containers[0].env.as_ref().unwrap();
        assert!(env.iter().any(|e| e.name == "NECO_BRANCH"));
        assert!(env.iter().any(|e| e.name == "NECO_APPS_BRANCH"));
    }

    #[test]
    fn stamp_skips_neco_apps_env_and_arg_when_flagged() {
        let vdc = vdc_fixture("demo", true, vec![]);
        let stamped = stamp_pod_template(base_template(), &vdc, "vdc-runner-system").unwrap();
        let spec = stamped.spec.unwrap();
        let env = spec.containers[0].env.as_ref().unwrap();
        assert!(!env.iter().any(|e| e.name == "NECO_APPS_BRANCH"));
        let args = spec.containers[0].args.as_ref().unwrap();
        assert!(!args.iter().any(|a| a.starts_with("neco_apps_bootstrap")));
    }

    #[test]
    fn stamp_appends_user_defined_command_when_present() {
        let vdc = vdc_fixture("demo", false, vec!["make".to_string(), "test".to_string()]);
        let stamped = stamp_pod_template(base_template(), &vdc, "vdc-runner-system").unwrap();
        let spec = stamped.spec.unwrap();
        let args = spec.containers[0].args.as_ref().unwrap();
        assert!(args.contains(&"user_defined_command:make test".to_string()));
    }
}
