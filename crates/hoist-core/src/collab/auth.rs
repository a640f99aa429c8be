//! Authentication profile resolution.

use async_trait::async_trait;

use crate::config::HoistConfig;

pub const DEFAULT_PROFILE: &str = "DEFAULT";

/// Resolved credentials handle, forwarded opaquely to every platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    pub profile: String,
    pub region: String,
    /// Why the credentials are unusable, if they are
    pub problem: Option<String>,
}

impl Authentication {
    pub fn new(profile: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            region: region.into(),
            problem: None,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.problem.is_none()
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve credentials for `profile`, or for the configured default.
    async fn authenticate(&self, profile: Option<&str>) -> anyhow::Result<Authentication>;
}

/// Resolves the profile and region from `hoist.toml` and command-line flags.
#[derive(Debug, Clone)]
pub struct ConfigAuthProvider {
    profile: Option<String>,
    region: Option<String>,
}

impl ConfigAuthProvider {
    pub fn new(config: &HoistConfig) -> Self {
        Self {
            profile: config.profile.clone(),
            region: config.region.clone(),
        }
    }
}

#[async_trait]
impl AuthProvider for ConfigAuthProvider {
    async fn authenticate(&self, profile: Option<&str>) -> anyhow::Result<Authentication> {
        let profile = profile
            .map(str::to_string)
            .or_else(|| self.profile.clone())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        let Some(region) = self.region.clone() else {
            return Ok(Authentication {
                problem: Some(format!("No region configured for profile {profile}")),
                region: String::new(),
                profile,
            });
        };
        Ok(Authentication::new(profile, region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn explicit_profile_wins_over_config() {
        let config = HoistConfig {
            profile: Some("TEAM".to_string()),
            region: Some("eu-frankfurt-1".to_string()),
            ..HoistConfig::default()
        };
        let provider = ConfigAuthProvider::new(&config);

        let auth = provider.authenticate(Some("ME")).await.unwrap();
        assert_eq!(auth.profile, "ME");
        assert!(auth.is_usable());

        let auth = provider.authenticate(None).await.unwrap();
        assert_eq!(auth.profile, "TEAM");
    }

    #[tokio::test]
    async fn missing_region_is_reported_as_problem() {
        let provider = ConfigAuthProvider::new(&HoistConfig::default());
        let auth = provider.authenticate(None).await.unwrap();
        assert_eq!(auth.profile, DEFAULT_PROFILE);
        assert!(!auth.is_usable());
    }
}
