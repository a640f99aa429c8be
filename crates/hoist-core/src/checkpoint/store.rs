//! Checkpoint persistence in the XDG state directory.
//!
//! Checkpoints live outside the deployed folders so that deploying does not
//! dirty the sources about to be pushed.

use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

use super::document::CheckpointDocument;

/// Location of one workspace's checkpoint.
///
/// Files are stored as `<state_dir>/checkpoints/<workspace_key>.checkpoint.json`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Default state directory for checkpoints.
    ///
    /// - Unix: `$XDG_STATE_HOME/hoist` or `~/.local/state/hoist`
    /// - Windows: `%LOCALAPPDATA%\hoist`
    pub fn default_state_dir() -> anyhow::Result<PathBuf> {
        let base = if cfg!(unix) {
            dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .ok_or_else(|| anyhow::anyhow!("Cannot determine state directory"))?
        } else {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Cannot determine local app data directory"))?
        };
        Ok(base.join("hoist"))
    }

    /// Stable key derived from the workspace path.
    ///
    /// Moving the workspace yields a new key, and with it a fresh checkpoint.
    pub fn workspace_key(workspace_root: &Path) -> String {
        let path = fs::canonicalize(workspace_root).unwrap_or_else(|_| {
            if workspace_root.is_absolute() {
                workspace_root.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(workspace_root))
                    .unwrap_or_else(|_| workspace_root.to_path_buf())
            }
        });
        blake3::hash(path.to_string_lossy().as_bytes())
            .to_hex()
            .to_string()
    }

    pub fn for_workspace(state_dir: &Path, workspace_root: &Path) -> Self {
        let key = Self::workspace_key(workspace_root);
        Self::from_path(
            state_dir
                .join("checkpoints")
                .join(format!("{key}.checkpoint.json")),
        )
    }

    pub fn from_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the stored document, `None` when no run was recorded yet.
    pub fn load(&self) -> anyhow::Result<Option<CheckpointDocument>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.path)
            .with_context(|| format!("Failed to read checkpoint: {}", self.path.display()))?;
        let doc: CheckpointDocument = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse checkpoint: {}", self.path.display()))?;
        doc.validate()?;
        Ok(Some(doc))
    }

    /// Save atomically (tmp + rename).
    pub fn save(&self, doc: &CheckpointDocument) -> anyhow::Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Invalid checkpoint path: {}", self.path.display()))?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create checkpoint directory: {}", dir.display()))?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkpoint.json".to_string());
        let tmp_path = dir.join(format!("{}.{}.tmp", file_name, std::process::id()));

        let bytes = serde_json::to_vec_pretty(doc).context("Failed to serialize checkpoint")?;
        fs::write(&tmp_path, bytes)
            .with_context(|| format!("Failed to write tmp checkpoint: {}", tmp_path.display()))?;

        // Remove first for replace semantics on Windows
        if self.path.exists() {
            fs::remove_file(&self.path).with_context(|| {
                format!("Failed to remove existing checkpoint: {}", self.path.display())
            })?;
        }
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to rename tmp checkpoint: {}", tmp_path.display()))?;

        Ok(())
    }

    /// Delete the stored document. Missing files are not an error.
    pub fn remove(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove checkpoint: {}", self.path.display()))?;
        }
        Ok(())
    }
}
