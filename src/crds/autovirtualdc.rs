//! The `AutoVirtualDC` custom resource: a cron-driven schedule that owns
//! at most one child `VirtualDC`.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::virtualdc::VirtualDcSpec;

fn default_schedule() -> String {
    String::new()
}

/// Desired state of a cron-scheduled owner of one `VirtualDC`.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "vdc.nyamber.cybozu.io",
    version = "v1beta1",
    kind = "AutoVirtualDC",
    namespaced,
    status = "AutoVirtualDcStatus",
    shortname = "avdc",
    printcolumn = r#"{"name":"NextStart", "type":"string", "jsonPath":".status.nextStartTime"}"#,
    printcolumn = r#"{"name":"NextStop", "type":"string", "jsonPath":".status.nextStopTime"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AutoVirtualDcSpec {
    /// `VirtualDcSpec` stamped onto the child `VirtualDC` this resource owns.
    pub template: VirtualDcSpec,

    /// Cron expression for when the child VDC should be (re)created.
    /// Empty string means "no schedule, create the child once and keep it."
    #[serde(default = "default_schedule")]
    pub start_schedule: String,

    /// Cron expression for when the child VDC should be deleted.
    /// Empty string means "never deleted on a schedule."
    #[serde(default = "default_schedule")]
    pub stop_schedule: String,

    /// `humantime`-parsable duration the child VDC may run before being
    /// force-deleted regardless of schedule (e.g. "1h"). Empty string
    /// disables the timeout.
    #[serde(default = "default_schedule")]
    pub timeout_duration: String,
}

/// Observed state of an `AutoVirtualDC`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoVirtualDcStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_start_time: Option<Time>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_stop_time: Option<Time>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn schedule_fields_default_to_empty() {
        let spec: AutoVirtualDcSpec = serde_json::from_str(r#"{"template":{}}"#).unwrap();
        assert_eq!(spec.start_schedule, "");
        assert_eq!(spec.stop_schedule, "");
        assert_eq!(spec.timeout_duration, "");
    }

    #[test]
    fn round_trips_through_json() {
        let spec = AutoVirtualDcSpec {
            template: VirtualDcSpec {
                neco_branch: "main".to_string(),
                neco_apps_branch: "main".to_string(),
                skip_neco_apps: false,
                command: vec![],
                resources: None,
            },
            start_schedule: "0 0 * * * *".to_string(),
            stop_schedule: "0 0 */6 * * *".to_string(),
            timeout_duration: "4h".to_string(),
        };
        let json = serde_json::to_string(&spec).unwrap();
        let back: AutoVirtualDcSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }

    #[test]
    fn crd_name_matches_group_and_kind() {
        assert_eq!(
            AutoVirtualDC::crd_name(),
            "autovirtualdcs.vdc.nyamber.cybozu.io"
        );
    }
}
