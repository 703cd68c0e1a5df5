//! Controller flag surface, parsed with `clap::Parser` so every flag is
//! also settable via its matching environment variable.

use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "vdc-controller", version, about = "VirtualDC/AutoVirtualDC operator")]
pub struct ControllerConfig {
    /// Address the Prometheus metrics endpoint binds to.
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = "0.0.0.0:8081")]
    pub metrics_bind_address: String,

    /// Address the `/healthz`/`/readyz` endpoints bind to.
    #[arg(long, env = "HEALTH_PROBE_BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    pub health_probe_bind_address: String,

    /// Enables leader election via a coordination.k8s.io Lease.
    #[arg(long, env = "LEADER_ELECT", default_value_t = false)]
    pub leader_elect: bool,

    /// Namespace runner pods and services are created in.
    #[arg(long, env = "POD_NAMESPACE")]
    pub pod_namespace: String,

    /// Fallback requeue interval for reconcilers that have nothing else
    /// to wait on, parsed with `humantime`.
    #[arg(long, env = "REQUEUE_INTERVAL", default_value = "60s")]
    pub requeue_interval: String,

    /// Name of the ConfigMap (in `pod_namespace`) holding the runner pod
    /// template under the `pod-template` key.
    #[arg(long, env = "POD_TEMPLATE_CONFIGMAP", default_value = "vdc-runner-template")]
    pub pod_template_configmap: String,
}

impl ControllerConfig {
    /// Validates flag combinations and pre-parses the duration fields.
    /// Called once from `main` right after `Parser::parse()`, before any
    /// reconciler is started.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pod_namespace.trim().is_empty() {
            anyhow::bail!("--pod-namespace must not be empty");
        }
        self.requeue_interval_duration()?;
        Ok(())
    }

    pub fn requeue_interval_duration(&self) -> anyhow::Result<Duration> {
        humantime::parse_duration(&self.requeue_interval)
            .map_err(|e| anyhow::anyhow!("invalid --requeue-interval {:?}: {e}", self.requeue_interval))
    }
}
