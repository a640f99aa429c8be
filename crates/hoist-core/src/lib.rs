//! Hoist Core Library
//!
//! Provisions build and deployment pipelines for local source folders,
//! resuming interrupted runs from a persisted checkpoint.

pub mod checkpoint;
pub mod collab;
pub mod config;
pub mod context;
pub mod deploy;
pub mod error;
pub mod manifest;
pub mod naming;
pub mod plan;
pub mod platform;
pub mod progress;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Context and configuration
    pub use crate::config::{ConfigScope, ConfigStore, HoistConfig};
    pub use crate::context::AppContext;

    // Checkpoint
    pub use crate::checkpoint::{Checkpoint, CheckpointDocument, CheckpointStore, RunStatus, Slot};

    // Deployment
    pub use crate::deploy::{
        CancelFlag, DeployRequest, Orchestrator, RunOutcome, Teardown, TeardownReport,
    };
    pub use crate::error::{DeployError, PlatformError};
    pub use crate::plan::{Plan, ProjectMode, Step, StepKind};
    pub use crate::progress::{ChannelSink, ProgressEvent, ProgressSink, TracingSink};

    // Platform and collaborators
    pub use crate::collab::{Collaborators, FixedParameters, NamePrompt, ParameterSource};
    pub use crate::platform::{LocalPlatform, ResourceDirectory, ResourceFactory};
    pub use crate::types::{Flavor, NamedRef, ResourceKind};
}
