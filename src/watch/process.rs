//! Polls a runner pod's `/status` endpoint on a fixed ticker and mirrors
//! the result onto its owning `VirtualDC`'s `PodJobCompleted` condition.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::api::{Api, PostParams};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};

use crate::crds::VirtualDC;
use crate::domain::conditions::{self, ConditionStatus};
use crate::domain::constants::{
    DEFAULT_POLL_INTERVAL_SECS, STATUS_CONFLICT_RETRIES, STATUS_CONFLICT_RETRY_DELAY_SECS,
};
use crate::domain::taxonomy::{ConditionType, JobCompletedReason};
use crate::error::{is_conflict, Error, Result};

/// One entry of a runner's `GET /status` response body, keyed by job name.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusEntry {
    pub name: String,
    pub status: JobRunState,
    #[serde(default)]
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum JobRunState {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    jobs: Vec<JobStatusEntry>,
}

/// Translates a runner's reported job list into the single
/// `PodJobCompleted` condition a `VirtualDC` carries. First non-completed
/// job in declared order wins; an empty or all-completed list is success.
pub fn translate(jobs: &[JobStatusEntry]) -> Condition {
    for job in jobs {
        let reason = match job.status {
            JobRunState::Failed => Some(JobCompletedReason::Failed),
            JobRunState::Pending => Some(JobCompletedReason::Pending),
            JobRunState::Running => Some(JobCompletedReason::Running),
            JobRunState::Completed => None,
        };
        if let Some(reason) = reason {
            return conditions::new_condition(
                ConditionType::PodJobCompleted.as_str(),
                ConditionStatus::False,
                reason.as_str(),
                format!("job {:?} is {:?}", job.name, job.status),
            );
        }
    }
    conditions::new_condition(
        ConditionType::PodJobCompleted.as_str(),
        ConditionStatus::True,
        JobCompletedReason::Ok.as_str(),
        "",
    )
}

/// Handle to a spawned poll loop; `stop()` cancels it and waits for the
/// task to actually exit, matching the Go source's `env.Stop(); env.Wait()`
/// pair.
pub struct JobWatchProcess {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl JobWatchProcess {
    /// Spawns the poll loop for one `VirtualDC`, targeting `status_url`
    /// (the runner Service's `/status` endpoint) and updating `vdc_api`.
    pub fn spawn(
        vdc_namespace: String,
        vdc_name: String,
        status_url: String,
        vdc_api: Api<VirtualDC>,
        http: reqwest::Client,
    ) -> Self {
        let token = CancellationToken::new();
        let child_token = token.clone();
        let handle = tokio::spawn(poll_loop(
            vdc_namespace,
            vdc_name,
            status_url,
            vdc_api,
            http,
            child_token,
        ));
        Self { token, handle }
    }

    /// Cancels the loop and waits for it to finish its current tick.
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

#[instrument(skip(vdc_api, http, token), fields(vdc = %format!("{vdc_namespace}/{vdc_name}")))]
async fn poll_loop(
    vdc_namespace: String,
    vdc_name: String,
    status_url: String,
    vdc_api: Api<VirtualDC>,
    http: reqwest::Client,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = tick(&vdc_name, &status_url, &vdc_api, &http).await {
                    error!(error = %e, "job watch tick failed");
                }
            }
        }
    }
}

async fn tick(
    vdc_name: &str,
    status_url: &str,
    vdc_api: &Api<VirtualDC>,
    http: &reqwest::Client,
) -> Result<()> {
    let resp = http
        .get(status_url)
        .send()
        .await
        .map_err(|e| Error::Other(anyhow::anyhow!("GET {status_url} failed: {e}")))?
        .json::<StatusResponse>()
        .await
        .map_err(|e| Error::Other(anyhow::anyhow!("decoding status response failed: {e}")))?;

    let new_condition = translate(&resp.jobs);

    for attempt in 0..=STATUS_CONFLICT_RETRIES {
        let current = vdc_api.get_status(vdc_name).await?;
        let mut new_conditions = current.status.clone().unwrap_or_default().conditions;
        conditions::set_condition(&mut new_conditions, new_condition.clone());

        if conditions::semantically_equal(
            &new_conditions,
            &current.status.clone().unwrap_or_default().conditions,
        ) {
            return Ok(());
        }

        let mut patched = current.clone();
        patched.status = Some(crate::crds::VirtualDcStatus {
            conditions: new_conditions,
        });

        match vdc_api
            .replace_status(
                vdc_name,
                &PostParams::default(),
                serde_json::to_vec(&patched)?,
            )
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) if is_conflict(&e) && attempt < STATUS_CONFLICT_RETRIES => {
                warn!(attempt, "status update conflict, retrying");
                tokio::time::sleep(Duration::from_secs(STATUS_CONFLICT_RETRY_DELAY_SECS)).await;
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
