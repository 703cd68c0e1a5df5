//! `vdc-runner`: executes an ordered list of shell jobs inside a VDC pod
//! and serves their live status over HTTP.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vdc_operator::domain::constants::RUNNER_LISTEN_PORT;
use vdc_operator::runner::job::parse_job_arg;
use vdc_operator::runner::{run_status_server, Runner};

/// Runs an ordered list of `NAME:COMMAND_LINE` jobs and serves `GET /status`.
#[derive(Parser, Debug)]
#[command(name = "vdc-runner", version, about = "DC test pod entrypoint")]
struct RunnerArgs {
    /// One or more `NAME:COMMAND_LINE` jobs, executed strictly in order.
    #[arg(required = true, num_args = 1..)]
    jobs: Vec<String>,

    /// Listening address and port for the status server.
    #[arg(long, default_value_t = format!(":{RUNNER_LISTEN_PORT}"))]
    listen_address: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vdc_operator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = RunnerArgs::parse();

    let specs = args
        .jobs
        .iter()
        .map(|arg| parse_job_arg(arg))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("invalid job argument: {e}"))?;

    info!(jobs = specs.len(), "starting vdc-runner");

    let runner = Arc::new(Runner::new(specs));
    let shutdown = CancellationToken::new();

    let executor = {
        let runner = runner.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { runner.run(shutdown).await })
    };

    let bind_address = normalize_listen_address(&args.listen_address);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;

    let server_shutdown = {
        let shutdown = shutdown.clone();
        async move { shutdown.cancelled().await }
    };

    tokio::select! {
        result = run_status_server(listener, runner.clone(), server_shutdown) => {
            if let Err(e) = result {
                error!(error = %e, "status server exited with error");
            }
        }
        () = shutdown_signal() => {
            info!("shutdown signal received");
            shutdown.cancel();
        }
    }

    shutdown.cancel();
    let _ = executor.await;
    info!("vdc-runner exiting");
    Ok(())
}

/// `clap`'s `default_value_t` needs a concrete `:8080`-style default; a
/// bare `:PORT` isn't a valid `TcpListener::bind` address on its own, so
/// this fills in the wildcard host the way Go's `net.Listen("tcp", addr)`
/// accepts `":8080"` but Rust's `ToSocketAddrs` does not.
fn normalize_listen_address(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
