//! Interactive answers for deployment parameters.
//!
//! Prompts only for what was not given on the command line.
//! Uses dialoguer for terminal UI prompts.

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};

use hoist_core::collab::{NamePrompt, ParameterSource};
use hoist_core::platform::ClusterInfo;
use hoist_core::types::{NamedRef, ResourceKind};

/// Pre-filled values from CLI args that skip prompts.
#[derive(Debug, Clone, Default)]
pub struct PrefilledOptions {
    /// Compartment id or name - if Some, skip compartment selection
    pub compartment: Option<String>,
    /// Project name - if Some, skip name prompt
    pub project_name: Option<String>,
    /// Never offer clusters
    pub no_cluster: bool,
}

/// Asks the user through dialoguer prompts.
#[derive(Debug, Default)]
pub struct PromptParameters {
    prefilled: PrefilledOptions,
}

impl PromptParameters {
    pub fn new(prefilled: PrefilledOptions) -> Self {
        Self { prefilled }
    }
}

impl ParameterSource for PromptParameters {
    fn select_compartment(&self, choices: &[NamedRef]) -> Result<Option<NamedRef>> {
        if let Some(wanted) = &self.prefilled.compartment {
            return Ok(find_compartment(choices, wanted));
        }
        if choices.is_empty() {
            return Ok(None);
        }

        let items: Vec<&str> = choices.iter().map(|c| c.name.as_str()).collect();
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Select the target compartment")
            .items(&items)
            .default(0)
            .interact_opt()?;
        Ok(selection.map(|index| choices[index].clone()))
    }

    fn select_cluster(&self, choices: &[ClusterInfo]) -> Result<Option<ClusterInfo>> {
        if self.prefilled.no_cluster || choices.is_empty() {
            return Ok(None);
        }

        let mut items: Vec<String> = choices.iter().map(|c| c.name.clone()).collect();
        items.push("Do not deploy to a cluster".to_string());
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Select the cluster to deploy to")
            .items(&items)
            .default(0)
            .interact_opt()?;
        Ok(selection.and_then(|index| choices.get(index).cloned()))
    }

    fn project_name(&self, suggested: &str) -> Result<Option<String>> {
        if let Some(name) = &self.prefilled.project_name {
            return Ok(Some(name.clone()));
        }

        let name: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Devops project name")
            .default(suggested.to_string())
            .interact_text()?;
        Ok(non_empty(name))
    }
}

impl NamePrompt for PromptParameters {
    fn replacement_name(&self, kind: ResourceKind, taken: &str) -> Result<Option<String>> {
        eprintln!(
            "{} {} name '{}' is already taken",
            style("!").yellow().bold(),
            kind,
            taken
        );
        let name: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Enter another name (empty to give up)")
            .allow_empty(true)
            .interact_text()?;
        Ok(non_empty(name))
    }
}

/// Yes/no question; `default` is used when the user just presses enter.
pub fn confirm(prompt: &str, default: bool) -> Result<bool> {
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default)
        .interact()?)
}

fn find_compartment(choices: &[NamedRef], wanted: &str) -> Option<NamedRef> {
    choices
        .iter()
        .find(|c| c.id == wanted || c.name == wanted)
        .cloned()
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compartments() -> Vec<NamedRef> {
        vec![NamedRef::new("c1", "dev"), NamedRef::new("c2", "prod")]
    }

    #[test]
    fn prefilled_compartment_skips_the_prompt() {
        let params = PromptParameters::new(PrefilledOptions {
            compartment: Some("prod".to_string()),
            ..Default::default()
        });
        let selected = params.select_compartment(&compartments()).unwrap();
        assert_eq!(selected.map(|c| c.id), Some("c2".to_string()));
    }

    #[test]
    fn unknown_prefilled_compartment_selects_nothing() {
        let params = PromptParameters::new(PrefilledOptions {
            compartment: Some("qa".to_string()),
            ..Default::default()
        });
        assert!(params.select_compartment(&compartments()).unwrap().is_none());
    }

    #[test]
    fn no_cluster_never_prompts() {
        let params = PromptParameters::new(PrefilledOptions {
            no_cluster: true,
            ..Default::default()
        });
        let cluster = ClusterInfo {
            id: "k1".to_string(),
            name: "dev".to_string(),
            compartment_id: "c1".to_string(),
            subnet_id: "s1".to_string(),
            subnet_compartment_id: "c1".to_string(),
        };
        assert!(params.select_cluster(&[cluster]).unwrap().is_none());
    }

    #[test]
    fn prefilled_project_name_is_used_verbatim() {
        let params = PromptParameters::new(PrefilledOptions {
            project_name: Some("shop".to_string()),
            ..Default::default()
        });
        assert_eq!(
            params.project_name("suggested").unwrap().as_deref(),
            Some("shop")
        );
    }

    #[test]
    fn blank_answers_are_none() {
        assert_eq!(non_empty("  ".to_string()), None);
        assert_eq!(non_empty(" shop ".to_string()).as_deref(), Some("shop"));
    }
}
