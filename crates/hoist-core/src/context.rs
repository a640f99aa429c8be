//! Application context for unified dependency injection.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::{ConfigScope, ConfigStore, HoistConfig};
use crate::platform::LocalPlatform;

/// Paths and services shared by every command.
///
/// The CLI creates this once and passes it to commands.
#[derive(Debug, Clone)]
pub struct AppContext {
    home_dir: PathBuf,
    project_root: PathBuf,
    state_dir: PathBuf,
    global_config_dir: PathBuf,
}

impl AppContext {
    /// Create a new context with explicit paths.
    pub fn new(home_dir: PathBuf, project_root: PathBuf, state_dir: PathBuf) -> Self {
        let global_config_dir = dirs::config_dir()
            .map(|p| p.join("hoist"))
            .unwrap_or_else(|| home_dir.join(".config").join("hoist"));

        Self {
            home_dir,
            project_root,
            state_dir,
            global_config_dir,
        }
    }

    /// Create context with custom global config directory (for testing).
    pub fn with_global_config_dir(
        home_dir: PathBuf,
        project_root: PathBuf,
        state_dir: PathBuf,
        global_config_dir: PathBuf,
    ) -> Self {
        Self {
            home_dir,
            project_root,
            state_dir,
            global_config_dir,
        }
    }

    /// Context for the current user and working directory.
    pub fn from_env() -> anyhow::Result<Self> {
        let home_dir =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
        let project_root =
            std::env::current_dir().context("Failed to determine current directory")?;
        let state_dir = CheckpointStore::default_state_dir()?;
        Ok(Self::new(home_dir, project_root, state_dir))
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn global_config_dir(&self) -> &Path {
        &self.global_config_dir
    }

    /// Get a ConfigStore for the given scope.
    pub fn config_store(&self, scope: ConfigScope) -> ConfigStore {
        ConfigStore::from_paths(
            scope,
            self.global_config_dir.clone(),
            self.project_root.clone(),
        )
    }

    /// Global configuration overlaid with the project's.
    pub fn load_config(&self) -> anyhow::Result<HoistConfig> {
        let global = self.config_store(ConfigScope::Global).load()?;
        let project = self.config_store(ConfigScope::Project).load()?;
        let merged = global.merge(&project);
        merged.validate()?;
        Ok(merged)
    }

    /// Store of the checkpoint belonging to the project root.
    pub fn checkpoint_store(&self) -> CheckpointStore {
        CheckpointStore::for_workspace(&self.state_dir, &self.project_root)
    }

    pub fn open_checkpoint(&self) -> anyhow::Result<Checkpoint> {
        let checkpoint = Checkpoint::open(self.checkpoint_store())?;
        checkpoint.doc().validate()?;
        Ok(checkpoint)
    }

    /// Directory of the local platform sandbox.
    pub fn platform_dir(&self, config: &HoistConfig) -> PathBuf {
        match &config.platform_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.project_root.join(dir),
            None => self.state_dir.join("sandbox"),
        }
    }

    pub fn open_platform(&self, config: &HoistConfig) -> anyhow::Result<LocalPlatform> {
        let dir = self.platform_dir(config);
        let platform = LocalPlatform::open(&dir)?;
        Ok(platform.with_polling(config.polling.interval(), config.polling.timeout()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> AppContext {
        AppContext::with_global_config_dir(
            temp.path().join("home"),
            temp.path().join("project"),
            temp.path().join("state"),
            temp.path().join("global"),
        )
    }

    #[test]
    fn project_config_overrides_global() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);

        let global = HoistConfig {
            profile: Some("DEFAULT".to_string()),
            region: Some("eu-frankfurt-1".to_string()),
            ..HoistConfig::default()
        };
        ctx.config_store(ConfigScope::Global).save(&global).unwrap();
        let project = HoistConfig {
            profile: Some("WORK".to_string()),
            ..HoistConfig::default()
        };
        ctx.config_store(ConfigScope::Project).save(&project).unwrap();

        let merged = ctx.load_config().unwrap();
        assert_eq!(merged.profile.as_deref(), Some("WORK"));
        assert_eq!(merged.region.as_deref(), Some("eu-frankfurt-1"));
    }

    #[test]
    fn relative_platform_dir_resolves_against_project_root() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);

        let default = ctx.platform_dir(&HoistConfig::default());
        assert_eq!(default, temp.path().join("state").join("sandbox"));

        let config = HoistConfig {
            platform_dir: Some(PathBuf::from(".sandbox")),
            ..HoistConfig::default()
        };
        assert_eq!(
            ctx.platform_dir(&config),
            temp.path().join("project").join(".sandbox")
        );
    }
}
