//! Minimal `coordination.k8s.io/v1` `Lease`-based leader election, gated by
//! `--leader-elect`.
//!
//! This module is ambient controller-process glue rather than a
//! reconciler concern: it decides which replica's
//! `Controller::run` streams are allowed to mutate cluster state, the same
//! acquire-then-renew shape every leader-election library in the ecosystem
//! implements over a `Lease`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const LEASE_DURATION_SECS: i32 = 15;
const RETRY_INTERVAL_SECS: u64 = 5;
const RENEW_INTERVAL_SECS: u64 = 5;
const FIELD_MANAGER: &str = "vdc-operator";

/// Blocks (retrying every [`RETRY_INTERVAL_SECS`]) until `identity` holds
/// the named `Lease` in `namespace`, creating it if absent.
pub async fn acquire(client: &Client, namespace: &str, name: &str, identity: &str) -> anyhow::Result<()> {
    let leases: Api<Lease> = Api::namespaced(client.clone(), namespace);
    loop {
        match leases.get(name).await {
            Ok(lease) => {
                let held_by_us = lease
                    .spec
                    .as_ref()
                    .and_then(|s| s.holder_identity.as_deref())
                    == Some(identity);
                if held_by_us || is_expired(&lease) {
                    claim(&leases, name, identity).await?;
                    info!(%identity, "acquired leader lease");
                    return Ok(());
                }
                info!(
                    held_by = ?lease.spec.as_ref().and_then(|s| s.holder_identity.clone()),
                    "waiting for leader lease"
                );
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                create(&leases, name, identity).await?;
                info!(%identity, "acquired leader lease (created)");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "failed to read leader lease, retrying");
            }
        }
        tokio::time::sleep(Duration::from_secs(RETRY_INTERVAL_SECS)).await;
    }
}

/// Spawns a background task that renews the held lease until `token` is
/// cancelled. If a renewal is ever rejected (another replica claimed the
/// lease), the task logs and keeps retrying rather than panicking — the
/// controller loses its lease the next time a rival successfully claims
/// it, at which point the `Controller::run` streams should be restarted
/// by the process supervisor.
pub fn spawn_renewer(
    client: Client,
    namespace: String,
    name: String,
    identity: String,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let leases: Api<Lease> = Api::namespaced(client, &namespace);
        let mut ticker = tokio::time::interval(Duration::from_secs(RENEW_INTERVAL_SECS));
        loop {
            tokio::select! {
                () = token.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(e) = renew(&leases, &name).await {
                        warn!(error = %e, "failed to renew leader lease");
                    }
                }
            }
        }
    })
}

fn is_expired(lease: &Lease) -> bool {
    let Some(spec) = lease.spec.as_ref() else {
        return true;
    };
    let Some(renew_time) = spec.renew_time.as_ref() else {
        return true;
    };
    let duration = spec.lease_duration_seconds.unwrap_or(LEASE_DURATION_SECS);
    renew_deadline(renew_time.0, duration) < Utc::now()
}

fn renew_deadline(renew_time: DateTime<Utc>, duration_secs: i32) -> DateTime<Utc> {
    renew_time + chrono::Duration::seconds(i64::from(duration_secs))
}

async fn create(leases: &Api<Lease>, name: &str, identity: &str) -> anyhow::Result<()> {
    let now = MicroTime(Utc::now());
    let lease = Lease {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(LeaseSpec {
            holder_identity: Some(identity.to_string()),
            lease_duration_seconds: Some(LEASE_DURATION_SECS),
            acquire_time: Some(now.clone()),
            renew_time: Some(now),
            lease_transitions: Some(0),
            ..Default::default()
        }),
    };
    leases.create(&PostParams::default(), &lease).await?;
    Ok(())
}

async fn claim(leases: &Api<Lease>, name: &str, identity: &str) -> anyhow::Result<()> {
    let now = MicroTime(Utc::now());
    let patch = Lease {
        metadata: ObjectMeta::default(),
        spec: Some(LeaseSpec {
            holder_identity: Some(identity.to_string()),
            lease_duration_seconds: Some(LEASE_DURATION_SECS),
            acquire_time: Some(now.clone()),
            renew_time: Some(now),
            ..Default::default()
        }),
    };
    leases
        .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

async fn renew(leases: &Api<Lease>, name: &str) -> anyhow::Result<()> {
    let patch = Lease {
        metadata: ObjectMeta::default(),
        spec: Some(LeaseSpec {
            renew_time: Some(MicroTime(Utc::now())),
            ..Default::default()
        }),
    };
    leases
        .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    Ok(())
}
