//! Crate-wide error type for reconcilers and the watch subsystem.
//!
//! Mirrors `controller::tasks::types::Error` in shape: one `thiserror`
//! variant per external failure mode, `#[from]`-wrapped where the
//! underlying library already has a good `Display`.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("finalizer error: {0}")]
    Finalizer(#[from] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("object has no name/namespace set")]
    MissingObjectKey,

    #[error("JSON serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("runner pod template is invalid: {0}")]
    TemplateError(String),

    #[error("invalid cron expression: {0}")]
    Cron(String),

    #[error("invalid duration: {0}")]
    Duration(String),

    #[error("controller configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Treats a kube not-found error as success, the same way the Go source's
/// `client.IgnoreNotFound(err)` does throughout the controllers package.
pub fn ignore_not_found(err: kube::Error) -> Result<()> {
    match &err {
        kube::Error::Api(ae) if ae.code == 404 => Ok(()),
        _ => Err(err.into()),
    }
}

/// `true` iff the error is a 409 Conflict from the API server (used for
/// optimistic-concurrency retry and create-race handling).
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// `true` iff the error is a 409 AlreadyExists from the API server on a
/// CREATE call (`kube` surfaces both 409 Conflict-on-update and
/// AlreadyExists-on-create as `Error::Api` with `code == 409`).
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}
