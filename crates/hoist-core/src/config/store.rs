//! Config store for loading and saving hoist.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{ConfigScope, HoistConfig, parser, paths::config_path_for_scope};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    scope: ConfigScope,
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn from_paths(scope: ConfigScope, global_dir: PathBuf, project_root: PathBuf) -> Self {
        let config_path = config_path_for_scope(scope, &global_dir, &project_root);
        Self { scope, config_path }
    }

    pub fn scope(&self) -> ConfigScope {
        self.scope
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn load(&self) -> anyhow::Result<HoistConfig> {
        if !self.config_path.exists() {
            return Ok(HoistConfig::new());
        }
        parser::parse_hoist_toml(&self.config_path)
    }

    pub fn save(&self, config: &HoistConfig) -> anyhow::Result<()> {
        let content = parser::to_toml(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!("Failed to write config file: {}", self.config_path.display())
        })?;
        Ok(())
    }
}
