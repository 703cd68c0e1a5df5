//! Shared naming conventions: API group, labels, finalizers, ports.

/// API group for the `VirtualDC`/`AutoVirtualDC` CRDs.
pub const API_GROUP: &str = "vdc.nyamber.cybozu.io";

/// CRD version.
pub const API_VERSION: &str = "v1beta1";

/// Shared finalizer name used by both the VDC and AVDC reconcilers.
pub const FINALIZER_NAME: &str = "vdc.nyamber.cybozu.io/finalizer";

/// Label key carrying the namespace of the VDC that owns a runner pod/service.
pub const LABEL_OWNER_NAMESPACE: &str = "vdc.nyamber.cybozu.io/owner-namespace";

/// Label key carrying the name of the VDC that owns a runner pod/service.
pub const LABEL_OWNER: &str = "vdc.nyamber.cybozu.io/owner";

/// Port the runner binary listens on inside the VDC pod.
pub const RUNNER_LISTEN_PORT: u16 = 8080;

/// Name of the single `ServicePort` exposed by a VDC's network endpoint.
pub const SERVICE_PORT_NAME: &str = "status";

/// Port the VDC's `Service` exposes externally (always targets `RUNNER_LISTEN_PORT`).
pub const SERVICE_PORT: i32 = 80;

/// Default polling cadence for `JobWatchProcess`.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default requeue interval used by reconcilers absent a more specific deadline.
pub const DEFAULT_REQUEUE_INTERVAL_SECS: u64 = 60;

/// Status-conflict retry count for `JobWatchProcess` status writes.
pub const STATUS_CONFLICT_RETRIES: u32 = 3;

/// Pause between status-conflict retries.
pub const STATUS_CONFLICT_RETRY_DELAY_SECS: u64 = 1;

/// Key inside the runner pod-template `ConfigMap` holding the YAML document.
pub const POD_TEMPLATE_CONFIGMAP_KEY: &str = "pod-template";

/// Default name of the `ConfigMap` holding the runner pod template, relative
/// to the controller's own namespace. Overridable via `ControllerConfig`.
pub const DEFAULT_POD_TEMPLATE_CONFIGMAP_NAME: &str = "vdc-runner-template";
