//! Collaborators invoked by the orchestrator through narrow interfaces.
//!
//! Each contract comes with the default implementation used by the CLI.

pub mod auth;
pub mod classifier;
pub mod params;
pub mod populator;
pub mod services;
pub mod templates;

pub use auth::{AuthProvider, Authentication, ConfigAuthProvider};
pub use classifier::{Classification, DescriptorClassifier, FolderClassifier, ProjectType};
pub use params::{FixedParameters, NamePrompt, ParameterSource};
pub use populator::{GitPopulator, RepositoryPopulator};
pub use services::{FileServicesWriter, ServicesConfig, ServicesConfigWriter};
pub use templates::{BuiltinTemplates, TemplateExpander, TemplateValues};

use std::sync::Arc;

use crate::config::HoistConfig;

/// Every collaborator a deployment needs, bundled for the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub auth: Arc<dyn AuthProvider>,
    pub classifier: Arc<dyn FolderClassifier>,
    pub populator: Arc<dyn RepositoryPopulator>,
    pub templates: Arc<dyn TemplateExpander>,
    pub params: Arc<dyn ParameterSource>,
    pub names: Arc<dyn NamePrompt>,
    pub services: Arc<dyn ServicesConfigWriter>,
}

impl Collaborators {
    /// Default implementations, with the given sources for the answers that
    /// need a user.
    pub fn standard(
        config: &HoistConfig,
        params: Arc<dyn ParameterSource>,
        names: Arc<dyn NamePrompt>,
    ) -> Self {
        Self {
            auth: Arc::new(ConfigAuthProvider::new(config)),
            classifier: Arc::new(DescriptorClassifier),
            populator: Arc::new(GitPopulator),
            templates: Arc::new(BuiltinTemplates),
            params,
            names,
            services: Arc::new(FileServicesWriter),
        }
    }
}
