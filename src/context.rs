//! Shared reconciler context, threaded through `kube::runtime::Controller`
//! into every reconcile call: the API client, parsed flags, the job
//! process manager, and an injected clock.

use std::sync::Arc;

use kube::Client;

use crate::config::ControllerConfig;
use crate::domain::Clock;
use crate::watch::JobProcessManager;

pub struct Context {
    pub client: Client,
    pub config: Arc<ControllerConfig>,
    pub job_manager: Arc<dyn JobProcessManager>,
    pub clock: Arc<dyn Clock>,
}

impl Context {
    pub fn new(
        client: Client,
        config: Arc<ControllerConfig>,
        job_manager: Arc<dyn JobProcessManager>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            config,
            job_manager,
            clock,
        })
    }
}
