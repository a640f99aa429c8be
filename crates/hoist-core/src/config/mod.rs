//! Configuration for the two scopes hoist reads:
//! - Global: `<config_dir>/hoist/hoist.toml`
//! - Project: `<project_root>/hoist.toml`, overriding global values

pub mod parser;
pub mod paths;
pub mod schema;
pub mod store;

use serde::{Deserialize, Serialize};

pub use parser::{parse_hoist_toml, parse_hoist_toml_str, to_toml};
pub use paths::config_path_for_scope;
pub use schema::{HoistConfig, PollingConfig};
pub use store::ConfigStore;

/// Configuration scope levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigScope {
    /// User-wide configuration
    Global,
    /// Per-project configuration next to the deployed folders
    Project,
}
