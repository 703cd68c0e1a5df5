//! Runs the real job executor behind the real `/status` HTTP server on a
//! loopback socket and polls it the way a liveness probe or a test harness
//! would: status starts `Pending`, moves through
//! `Running`, and settles once every job finishes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use vdc_operator::runner::job::JobSpec;
use vdc_operator::runner::{run_status_server, Runner};

async fn start_server(jobs: Vec<JobSpec>) -> (String, Arc<Runner>, CancellationToken, tokio::task::JoinHandle<()>) {
    let runner = Arc::new(Runner::new(jobs));
    let shutdown = CancellationToken::new();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_runner = runner.clone();
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        run_status_server(listener, server_runner, async move {
            server_shutdown.cancelled().await;
        })
        .await
        .unwrap();
    });

    let exec_runner = runner.clone();
    let exec_shutdown = shutdown.clone();
    tokio::spawn(async move { exec_runner.run(exec_shutdown).await });

    (format!("http://{addr}"), runner, shutdown, server)
}

async fn fetch_status(base: &str) -> serde_json::Value {
    reqwest::get(format!("{base}/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn status_reflects_job_progress_until_all_jobs_complete() {
    let jobs = vec![
        JobSpec { name: "first".to_string(), command: "true".to_string(), args: vec![] },
        JobSpec { name: "second".to_string(), command: "true".to_string(), args: vec![] },
    ];
    let (base, _runner, shutdown, server) = start_server(jobs).await;

    let settled = timeout(Duration::from_secs(5), async {
        loop {
            let body = fetch_status(&base).await;
            let statuses: Vec<_> = body["jobs"]
                .as_array()
                .unwrap()
                .iter()
                .map(|j| j["status"].as_str().unwrap().to_string())
                .collect();
            if statuses.iter().all(|s| s == "Completed") {
                break body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("jobs did not settle in time");

    assert_eq!(settled["jobs"][0]["name"], "first");
    assert_eq!(settled["jobs"][0]["status"], "Completed");
    assert_eq!(settled["jobs"][1]["status"], "Completed");

    shutdown.cancel();
    server.await.unwrap();
}

#[tokio::test]
async fn a_failing_job_leaves_the_rest_pending_forever() {
    let jobs = vec![
        JobSpec { name: "bad".to_string(), command: "false".to_string(), args: vec![] },
        JobSpec { name: "never-runs".to_string(), command: "true".to_string(), args: vec![] },
    ];
    let (base, _runner, shutdown, server) = start_server(jobs).await;

    let settled = timeout(Duration::from_secs(5), async {
        loop {
            let body = fetch_status(&base).await;
            if body["jobs"][0]["status"] == "Failed" {
                break body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("first job did not fail in time");

    assert_eq!(settled["jobs"][0]["status"], "Failed");
    assert_eq!(settled["jobs"][1]["status"], "Pending");
    assert!(settled["jobs"][1]["startTime"].is_null());

    shutdown.cancel();
    server.await.unwrap();
}
