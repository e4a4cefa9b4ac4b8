//! Reconciliation error abstractions.

use std::time::Duration;

use fdb_core::ModelError;

/// An error which stops a reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// An error returned from the K8s API.
    #[error("kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
    /// A write was rejected because the object changed since it was loaded.
    #[error("conflict updating {kind} {name}, object has been modified")]
    Conflict { kind: String, name: String },
    /// The persisted state of an object is invalid.
    #[error(transparent)]
    Model(#[from] ModelError),
    /// An error returned from a cluster admin client.
    #[error("admin client error: {0:#}")]
    AdminClient(#[source] anyhow::Error),
    /// The pass was cancelled due to shutdown.
    #[error("reconciliation pass cancelled")]
    Cancelled,
    /// A call made by the pass did not complete in time.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    /// A required collaborator was not configured.
    #[error("reconciler is missing a required capability: {0}")]
    MissingCapability(&'static str),
}

impl ReconcileError {
    /// Check if this error requires the process to shutdown instead of retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingCapability(_))
    }

    /// Map the given K8s error for a write against an object of the given kind & name.
    ///
    /// HTTP 409 responses are surfaced as conflicts.
    pub fn from_write(kind: &str, name: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 409 => Self::Conflict {
                kind: kind.into(),
                name: name.into(),
            },
            err => Self::Kube(err),
        }
    }
}

impl From<kube::Error> for ReconcileError {
    fn from(err: kube::Error) -> Self {
        Self::Kube(err)
    }
}

/// A result type where the error is a `ReconcileError`.
pub type ReconcileResult<T> = ::std::result::Result<T, ReconcileError>;
