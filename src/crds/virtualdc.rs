//! The `VirtualDC` custom resource: desired and observed state of one
//! ephemeral virtual data center.

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_branch() -> String {
    "main".to_string()
}

/// Desired state of one ephemeral virtual data center.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "vdc.nyamber.cybozu.io",
    version = "v1beta1",
    kind = "VirtualDC",
    namespaced,
    status = "VirtualDcStatus",
    shortname = "vdc",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"PodAvailable\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualDcSpec {
    /// Branch of `neco` to check out in the runner pod.
    #[serde(default = "default_branch")]
    pub neco_branch: String,

    /// Branch of `neco-apps` to check out, ignored when `skip_neco_apps` is set.
    #[serde(default = "default_branch")]
    pub neco_apps_branch: String,

    /// Skips the `neco-apps` bootstrap step entirely.
    #[serde(default)]
    pub skip_neco_apps: bool,

    /// Extra command run after bootstrap, stamped onto the runner's argv
    /// as a `user_defined_command:` entry.
    #[serde(default)]
    pub command: Vec<String>,

    /// Resource requests/limits applied to the runner pod's first container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Observed state of a `VirtualDC`, expressed entirely as conditions
///: `PodCreated`, `PodAvailable`, `ServiceCreated`,
/// `PodJobCompleted`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualDcStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn spec_defaults_apply_when_fields_absent() {
        let spec: VirtualDcSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.neco_branch, "main");
        assert_eq!(spec.neco_apps_branch, "main");
        assert!(!spec.skip_neco_apps);
        assert!(spec.command.is_empty());
        assert!(spec.resources.is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let spec = VirtualDcSpec {
            neco_branch: "release-1.30".to_string(),
            neco_apps_branch: "main".to_string(),
            skip_neco_apps: true,
            command: vec!["make".to_string(), "test".to_string()],
            resources: None,
        };
        let json = serde_json::to_string(&spec).unwrap();
        let back: VirtualDcSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }

    #[test]
    fn crd_name_matches_group_and_kind() {
        assert_eq!(VirtualDC::crd_name(), "virtualdcs.vdc.nyamber.cybozu.io");
    }
}
