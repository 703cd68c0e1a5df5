//! Tracks one [`JobWatchProcess`] per live `VirtualDC`: a synchronized map
//! keyed by the owning object, plus a `stopped` flag that makes `start`
//! after `stop_all` a no-op instead of leaking a loop past shutdown.

use std::collections::HashMap;

use async_trait::async_trait;
use kube::api::Api;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::crds::VirtualDC;
use crate::watch::process::JobWatchProcess;

pub type WatchKey = (String, String);

/// Starts, stops, and tracks per-`VirtualDC` watch loops.
#[async_trait]
pub trait JobProcessManager: Send + Sync {
    /// Starts a watch loop for `(namespace, name)` if one isn't already
    /// running. A no-op after [`JobProcessManager::stop_all`].
    async fn start(
        &self,
        namespace: &str,
        name: &str,
        status_url: String,
        vdc_api: Api<VirtualDC>,
    );

    /// Stops and removes the watch loop for `(namespace, name)`, if any,
    /// awaiting its exit before returning.
    async fn stop(&self, namespace: &str, name: &str);

    /// Stops every running watch loop and marks the manager stopped.
    async fn stop_all(&self);
}

struct Inner {
    processes: HashMap<WatchKey, JobWatchProcess>,
    stopped: bool,
}

/// Production [`JobProcessManager`], backed by a `tokio::sync::Mutex` since
/// `stop`/`stop_all` must `.await` a spawned task's join handle while
/// holding it.
pub struct RealJobProcessManager {
    inner: Mutex<Inner>,
    http: reqwest::Client,
}

impl RealJobProcessManager {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            inner: Mutex::new(Inner {
                processes: HashMap::new(),
                stopped: false,
            }),
            http,
        }
    }
}

impl Default for RealJobProcessManager {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl JobProcessManager for RealJobProcessManager {
    #[instrument(skip(self, vdc_api), fields(vdc = %format!("{namespace}/{name}")))]
    async fn start(
        &self,
        namespace: &str,
        name: &str,
        status_url: String,
        vdc_api: Api<VirtualDC>,
    ) {
        let mut inner = self.inner.lock().await;
        if inner.stopped {
            return;
        }
        let key = (namespace.to_string(), name.to_string());
        if inner.processes.contains_key(&key) {
            return;
        }
        info!("starting job watch process");
        let process = JobWatchProcess::spawn(
            namespace.to_string(),
            name.to_string(),
            status_url,
            vdc_api,
            self.http.clone(),
        );
        inner.processes.insert(key, process);
    }

    async fn stop(&self, namespace: &str, name: &str) {
        let process = {
            let mut inner = self.inner.lock().await;
            inner.processes.remove(&(namespace.to_string(), name.to_string()))
        };
        if let Some(process) = process {
            process.stop().await;
        }
    }

    async fn stop_all(&self) {
        let processes: Vec<JobWatchProcess> = {
            let mut inner = self.inner.lock().await;
            inner.stopped = true;
            inner.processes.drain().map(|(_, v)| v).collect()
        };
        for process in processes {
            process.stop().await;
        }
    }
}
