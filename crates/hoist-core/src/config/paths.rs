//! Config path resolution helpers.

use std::path::{Path, PathBuf};

use super::ConfigScope;

pub const CONFIG_FILE: &str = "hoist.toml";

pub fn config_path_for_scope(
    scope: ConfigScope,
    global_dir: &Path,
    project_root: &Path,
) -> PathBuf {
    match scope {
        ConfigScope::Global => global_dir.join(CONFIG_FILE),
        ConfigScope::Project => project_root.join(CONFIG_FILE),
    }
}
