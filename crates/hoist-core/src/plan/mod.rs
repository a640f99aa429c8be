//! Pipeline assembly.
//!
//! A plan is plain data: an ordered list of step descriptors and its total
//! weight. The runner consumes it uniformly, so feature flags and project
//! types are only consulted here.

pub mod assembler;
pub mod step;

pub use assembler::{
    ADOPTED_PROJECT_WEIGHT, FeatureFlags, Plan, ProjectMode, assemble, build_chain,
    build_flavors, cluster_chain, cluster_setup, folder_steps, folder_tail, image_chain,
    project_steps,
};
pub use step::{Step, StepKind};
