//! Sequential job execution for the in-VDC runner: each job runs to
//! completion or failure before the next one starts, classified into the
//! same three-way success/failure/still-running outcome a process
//! supervisor uses for any child process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// One job as parsed from the CLI: `NAME:COMMAND_LINE`, split
/// on the first `:`, command line split on spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
}

/// `true` iff `name` matches `^[A-Za-z][-_A-Za-z0-9]*$`.
pub fn is_valid_job_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parses one positional CLI argument into a [`JobSpec`], rejecting a
/// malformed `NAME:COMMAND`.
pub fn parse_job_arg(arg: &str) -> Result<JobSpec, String> {
    let (name, command_line) = arg
        .split_once(':')
        .ok_or_else(|| format!("{arg:?} is missing a ':' separator between job name and command"))?;

    if !is_valid_job_name(name) {
        return Err(format!(
            "job name {name:?} must match ^[A-Za-z][-_A-Za-z0-9]*$"
        ));
    }

    let mut tokens = command_line.split(' ').filter(|t| !t.is_empty());
    let command = tokens
        .next()
        .ok_or_else(|| format!("job {name:?} has an empty command"))?
        .to_string();
    let args = tokens.map(str::to_string).collect();

    Ok(JobSpec {
        name: name.to_string(),
        command,
        args,
    })
}

/// Runtime state of one job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
struct JobRecord {
    spec: JobSpec,
    state: JobState,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

/// One entry of the `GET /status` response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub name: String,
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// `GET /status` response body: `{"jobs": [...]}`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub jobs: Vec<JobStatusView>,
}

/// Executes a fixed, ordered list of jobs one at a time and serves a
/// point-in-time snapshot to the HTTP handler. The job list itself never
/// changes after construction; only each entry's state does.
pub struct Runner {
    jobs: Arc<Mutex<Vec<JobRecord>>>,
}

impl Runner {
    pub fn new(specs: Vec<JobSpec>) -> Self {
        let jobs = specs
            .into_iter()
            .map(|spec| JobRecord {
                spec,
                state: JobState::Pending,
                start_time: None,
                end_time: None,
            })
            .collect();
        Self {
            jobs: Arc::new(Mutex::new(jobs)),
        }
    }

    /// Runs the configured jobs in declared order until the list is
    /// exhausted, a job fails, or `token` is cancelled. A failed or never-
    /// reached job leaves every job after it `Pending` forever.
    #[instrument(skip(self, token))]
    pub async fn run(&self, token: CancellationToken) {
        let len = self.jobs.lock().await.len();
        for idx in 0..len {
            if token.is_cancelled() {
                return;
            }

            let spec = self.jobs.lock().await[idx].spec.clone();

            {
                let mut jobs = self.jobs.lock().await;
                jobs[idx].state = JobState::Running;
                jobs[idx].start_time = Some(Utc::now());
            }
            info!(job = %spec.name, command = %spec.command, "starting job");

            let mut child = match Command::new(&spec.command).args(&spec.args).spawn() {
                Ok(child) => child,
                Err(e) => {
                    warn!(job = %spec.name, error = %e, "failed to spawn job");
                    self.finish(idx, JobState::Failed).await;
                    return;
                }
            };

            let wait_result = tokio::select! {
                _ = token.cancelled() => {
                    let _ = child.kill().await;
                    return;
                }
                result = child.wait() => result,
            };

            let final_state = match wait_result {
                Ok(status) if status.success() => JobState::Completed,
                Ok(status) => {
                    warn!(job = %spec.name, ?status, "job exited non-zero");
                    JobState::Failed
                }
                Err(e) => {
                    warn!(job = %spec.name, error = %e, "failed to wait on job");
                    JobState::Failed
                }
            };

            let failed = final_state == JobState::Failed;
            self.finish(idx, final_state).await;
            if failed {
                return;
            }
        }
    }

    async fn finish(&self, idx: usize, state: JobState) {
        let mut jobs = self.jobs.lock().await;
        jobs[idx].state = state;
        jobs[idx].end_time = Some(Utc::now());
    }

    /// A consistent point-in-time view of every job's state, safe to call
    /// concurrently with [`Runner::run`] — the lock ensures no caller ever
    /// observes a job mid-transition.
    pub async fn snapshot(&self) -> StatusResponse {
        let jobs = self.jobs.lock().await;
        StatusResponse {
            jobs: jobs
                .iter()
                .map(|j| JobStatusView {
                    name: j.spec.name.clone(),
                    status: j.state,
                    start_time: j.start_time,
                    end_time: j.end_time,
                })
                .collect(),
        }
    }
}
