//! FDB operator model errors.

use thiserror::Error;

/// Errors produced while interpreting the declared or persisted state of a resource.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ModelError {
    /// A persisted process group ID could not be parsed.
    #[error("invalid process group ID {id:?}: {reason}")]
    InvalidProcessGroupId { id: String, reason: String },
    /// The declared cluster configuration is malformed.
    #[error("invalid cluster configuration: {0}")]
    InvalidConfiguration(String),
}

impl ModelError {
    pub(crate) fn invalid_id(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProcessGroupId { id: id.into(), reason: reason.into() }
    }
}
