//! Schema of `hoist.toml`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings read from `hoist.toml`.
///
/// Every field is optional on disk so that a project file only needs to
/// name what it overrides; the accessors apply the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HoistConfig {
    /// Authentication profile used when a checkpoint does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Upload build outputs straight to the container build instead of
    /// publishing them as artifacts first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bypass_artifacts: Option<bool>,

    /// Also set up native executable pipelines where a folder supports them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_pipelines: Option<bool>,

    /// Never set up cluster deployment pipelines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_cluster: Option<bool>,

    /// How many replacement names are tried after a name conflict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_conflict_retries: Option<u32>,

    /// Directory of the local sandbox platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "PollingConfig::is_empty")]
    pub polling: PollingConfig,
}

/// Work-request polling settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl PollingConfig {
    pub const DEFAULT_INTERVAL_MS: u64 = 1000;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

    fn is_empty(&self) -> bool {
        self.interval_ms.is_none() && self.timeout_secs.is_none()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.unwrap_or(Self::DEFAULT_INTERVAL_MS))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(Self::DEFAULT_TIMEOUT_SECS))
    }
}

impl HoistConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(profile) = &self.profile
            && profile.trim().is_empty()
        {
            anyhow::bail!("profile must not be empty");
        }
        if let Some(region) = &self.region
            && region.trim().is_empty()
        {
            anyhow::bail!("region must not be empty");
        }
        if self.polling.interval_ms == Some(0) {
            anyhow::bail!("polling.interval_ms must be greater than zero");
        }
        if self.polling.timeout_secs == Some(0) {
            anyhow::bail!("polling.timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Overlay `other` on top of `self`; values set in `other` win.
    pub fn merge(&self, other: &HoistConfig) -> HoistConfig {
        HoistConfig {
            profile: other.profile.clone().or_else(|| self.profile.clone()),
            region: other.region.clone().or_else(|| self.region.clone()),
            bypass_artifacts: other.bypass_artifacts.or(self.bypass_artifacts),
            native_pipelines: other.native_pipelines.or(self.native_pipelines),
            skip_cluster: other.skip_cluster.or(self.skip_cluster),
            name_conflict_retries: other.name_conflict_retries.or(self.name_conflict_retries),
            platform_dir: other
                .platform_dir
                .clone()
                .or_else(|| self.platform_dir.clone()),
            polling: PollingConfig {
                interval_ms: other.polling.interval_ms.or(self.polling.interval_ms),
                timeout_secs: other.polling.timeout_secs.or(self.polling.timeout_secs),
            },
        }
    }

    pub fn bypass_artifacts(&self) -> bool {
        self.bypass_artifacts.unwrap_or(false)
    }

    pub fn native_pipelines(&self) -> bool {
        self.native_pipelines.unwrap_or(true)
    }

    pub fn skip_cluster(&self) -> bool {
        self.skip_cluster.unwrap_or(false)
    }

    pub fn name_conflict_retries(&self) -> u32 {
        self.name_conflict_retries.unwrap_or(1)
    }
}
