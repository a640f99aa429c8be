//! Deployment parameter collection.
//!
//! The CLI answers these questions interactively; [`FixedParameters`] answers
//! them from values known up front (flags, `--yes`, tests).

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::platform::ClusterInfo;
use crate::types::{NamedRef, ResourceKind};

/// Picks the deployment target. Returning `None` cancels the run.
pub trait ParameterSource: Send + Sync {
    fn select_compartment(&self, choices: &[NamedRef]) -> anyhow::Result<Option<NamedRef>>;

    /// `Ok(None)` means "do not deploy to a cluster".
    fn select_cluster(&self, choices: &[ClusterInfo]) -> anyhow::Result<Option<ClusterInfo>>;

    fn project_name(&self, suggested: &str) -> anyhow::Result<Option<String>>;
}

/// Asked for a replacement after a display-name conflict.
pub trait NamePrompt: Send + Sync {
    fn replacement_name(&self, kind: ResourceKind, taken: &str) -> anyhow::Result<Option<String>>;
}

/// Non-interactive answers.
#[derive(Debug, Default)]
pub struct FixedParameters {
    compartment: Option<String>,
    cluster: bool,
    project_name: Option<String>,
    replacements: Mutex<VecDeque<String>>,
    derive_replacements: bool,
}

impl FixedParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target compartment, matched by id or by name.
    pub fn with_compartment(mut self, compartment: impl Into<String>) -> Self {
        self.compartment = Some(compartment.into());
        self
    }

    /// Deploy to the first cluster offered.
    pub fn with_cluster(mut self, cluster: bool) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    /// Replacement names handed out in order after name conflicts.
    pub fn with_replacements<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let replacements = names.into_iter().map(Into::into).collect();
        Self {
            replacements: Mutex::new(replacements),
            ..self
        }
    }

    /// Once the queued replacements are used up, append a counter to the
    /// taken name instead of giving up.
    pub fn deriving_replacements(mut self) -> Self {
        self.derive_replacements = true;
        self
    }
}

impl ParameterSource for FixedParameters {
    fn select_compartment(&self, choices: &[NamedRef]) -> anyhow::Result<Option<NamedRef>> {
        Ok(match &self.compartment {
            Some(wanted) => choices
                .iter()
                .find(|c| &c.id == wanted || &c.name == wanted)
                .cloned(),
            None => choices.first().cloned(),
        })
    }

    fn select_cluster(&self, choices: &[ClusterInfo]) -> anyhow::Result<Option<ClusterInfo>> {
        Ok(if self.cluster {
            choices.first().cloned()
        } else {
            None
        })
    }

    fn project_name(&self, suggested: &str) -> anyhow::Result<Option<String>> {
        Ok(Some(
            self.project_name
                .clone()
                .unwrap_or_else(|| suggested.to_string()),
        ))
    }
}

impl NamePrompt for FixedParameters {
    fn replacement_name(&self, _kind: ResourceKind, taken: &str) -> anyhow::Result<Option<String>> {
        let mut queue = self
            .replacements
            .lock()
            .map_err(|_| anyhow::anyhow!("replacement name queue poisoned"))?;
        if let Some(name) = queue.pop_front() {
            return Ok(Some(name));
        }
        Ok(self.derive_replacements.then(|| next_numbered(taken)))
    }
}

/// `shop` -> `shop1`, `shop1` -> `shop2`.
fn next_numbered(name: &str) -> String {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (base, number) = name.split_at(name.len() - digits);
    let next = number.parse::<u64>().map(|n| n + 1).unwrap_or(1);
    format!("{base}{next}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacements_are_handed_out_in_order_then_derived() {
        let params = FixedParameters::new()
            .with_replacements(["shop-b"])
            .deriving_replacements();
        let kind = ResourceKind::Project;
        assert_eq!(
            params.replacement_name(kind, "shop").unwrap().as_deref(),
            Some("shop-b")
        );
        assert_eq!(
            params.replacement_name(kind, "shop-b").unwrap().as_deref(),
            Some("shop-b1")
        );
        assert_eq!(
            params.replacement_name(kind, "shop9").unwrap().as_deref(),
            Some("shop10")
        );
    }

    #[test]
    fn no_replacement_without_queue() {
        let params = FixedParameters::new();
        assert_eq!(
            params
                .replacement_name(ResourceKind::Project, "shop")
                .unwrap(),
            None
        );
    }

    #[test]
    fn compartment_matches_id_or_name() {
        let choices = vec![NamedRef::new("c1", "dev"), NamedRef::new("c2", "prod")];
        let by_name = FixedParameters::new().with_compartment("prod");
        assert_eq!(
            by_name.select_compartment(&choices).unwrap().unwrap().id,
            "c2"
        );
        let missing = FixedParameters::new().with_compartment("qa");
        assert!(missing.select_compartment(&choices).unwrap().is_none());
    }
}
