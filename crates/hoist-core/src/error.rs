//! Error types for platform calls and deployment runs.

use thiserror::Error;

use crate::types::ResourceKind;

/// Errors reported by the resource directory and resource factory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The addressed resource does not exist
    #[error("{kind} '{id}' not found")]
    NotFound { kind: ResourceKind, id: String },

    /// A resource with the same display name already exists in scope
    #[error("{kind} name '{name}' already exists")]
    AlreadyExists { kind: ResourceKind, name: String },

    /// The platform refused the request (permissions, quota, validation)
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The platform could not be reached or answered with a server error
    #[error("platform unavailable: {0}")]
    Unavailable(String),

    /// A long-running work request ended without producing a resource
    #[error("work request {handle} failed: {reason}")]
    WorkRequestFailed { handle: String, reason: String },
}

impl PlatformError {
    /// Whether this error is a display-name collision.
    pub fn is_name_conflict(&self) -> bool {
        matches!(self, PlatformError::AlreadyExists { .. })
    }
}

/// Result type for deployment runs.
pub type Result<T> = std::result::Result<T, DeployError>;

/// Errors that abort a deployment run.
///
/// Each variant renders as the single human-readable message shown to the user.
#[derive(Error, Debug)]
pub enum DeployError {
    /// A folder or run precondition does not hold (no build command, missing
    /// artifact location, already versioned folder, ...)
    #[error("{0}")]
    Precondition(String),

    /// A remote call failed while executing a step
    #[error("{message}: {source}")]
    Remote {
        message: String,
        #[source]
        source: PlatformError,
    },

    /// A display name kept colliding after the allowed renames
    #[error("{kind} name '{name}' already exists and no further renames are allowed")]
    NameConflict { kind: ResourceKind, name: String },

    /// A background work request failed; surfaced at its join point
    #[error("{what} did not complete: {source}")]
    Background {
        what: String,
        #[source]
        source: PlatformError,
    },

    /// The run was cancelled by the user at a step boundary
    #[error("Deployment cancelled")]
    Cancelled,

    /// The checkpoint document could not be persisted
    #[error("Failed to persist deployment checkpoint: {0:#}")]
    Checkpoint(anyhow::Error),

    /// An external collaborator (template expander, populator, config writer) failed
    #[error("{message}: {source:#}")]
    Collaborator {
        message: String,
        source: anyhow::Error,
    },
}

impl DeployError {
    pub fn remote(message: impl Into<String>, source: PlatformError) -> Self {
        DeployError::Remote {
            message: message.into(),
            source,
        }
    }

    pub fn collaborator(message: impl Into<String>, source: anyhow::Error) -> Self {
        DeployError::Collaborator {
            message: message.into(),
            source,
        }
    }
}
