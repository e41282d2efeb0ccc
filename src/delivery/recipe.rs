// Recipe payload handed to the delivery system when an experiment ships

use serde::Serialize;
use serde_json::Value;

use super::DeliveryError;
use crate::experiment::{Experiment, ExperimentKind, Platform};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipePayload {
    pub action_name: &'static str,
    pub name: String,
    pub filter_expression: String,
    pub comment: String,
    pub arguments: RecipeArguments,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecipeArguments {
    Preference(PreferenceArguments),
    OptOutStudy(OptOutStudyArguments),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceArguments {
    pub slug: String,
    pub experiment_document_url: String,
    pub preference_name: String,
    pub preference_type: String,
    pub preference_branch_type: String,
    pub is_high_population: bool,
    pub branches: Vec<RecipeBranch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeBranch {
    pub slug: String,
    pub ratio: u8,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptOutStudyArguments {
    pub name: String,
    pub description: String,
    pub addon_url: String,
    pub is_enrollment_paused: bool,
}

fn unavailable(reason: impl Into<String>) -> DeliveryError {
    DeliveryError::PayloadUnavailable {
        reason: reason.into(),
    }
}

fn quoted_list(values: &[String]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| format!("{v:?}")).collect();
    format!("[{}]", quoted.join(", "))
}

/// JEXL filter built from channel, versions, locales, countries and platform
pub fn filter_expression(experiment: &Experiment) -> String {
    let population = &experiment.content.population;
    let mut clauses = Vec::new();

    if let Some(channel) = population.channel {
        clauses.push(format!(
            "normandy.channel in [\"{}\"]",
            channel.as_str().to_lowercase()
        ));
    }
    if let Some(min) = population.min_version.as_ref().and_then(|v| v.major()) {
        clauses.push(format!("normandy.version|versionCompare('{min}.!') >= 0"));
    }
    if let Some(max) = population.max_version.as_ref().and_then(|v| v.major()) {
        clauses.push(format!("normandy.version|versionCompare('{max}.*') < 0"));
    }
    if !population.locales.is_empty() {
        clauses.push(format!("normandy.locale in {}", quoted_list(&population.locales)));
    }
    if !population.countries.is_empty() {
        clauses.push(format!("normandy.country in {}", quoted_list(&population.countries)));
    }
    match population.platform {
        Platform::All => {}
        Platform::Windows => clauses.push("normandy.os.isWindows".to_string()),
        Platform::Mac => clauses.push("normandy.os.isMac".to_string()),
        Platform::Linux => clauses.push("normandy.os.isLinux".to_string()),
    }
    clauses.join(" && ")
}

/// Render the recipe for a pref or add-on experiment that has reached Ship
pub fn build_recipe(experiment: &Experiment, experiment_url: &str) -> Result<RecipePayload, DeliveryError> {
    let slug = experiment
        .delivery
        .slug
        .clone()
        .ok_or_else(|| unavailable("experiment has not been marked ready to ship"))?;
    let content = &experiment.content;
    let name = if content.overview.public_name.is_empty() {
        experiment.name.clone()
    } else {
        content.overview.public_name.clone()
    };

    let (action_name, arguments) = match experiment.kind {
        ExperimentKind::Pref => {
            let design = &content.design;
            let pref_type = design
                .pref_type
                .ok_or_else(|| unavailable("pref type is not set"))?;
            let pref_branch = design
                .pref_branch
                .ok_or_else(|| unavailable("pref branch is not set"))?;

            let mut branches = Vec::with_capacity(content.branches.len());
            for branch in &content.branches {
                let raw = branch
                    .value
                    .as_deref()
                    .ok_or_else(|| unavailable(format!("branch {} has no value", branch.name)))?;
                let value = serde_json::from_str(raw)
                    .map_err(|e| unavailable(format!("branch {} value: {e}", branch.name)))?;
                branches.push(RecipeBranch {
                    slug: branch.slug.clone(),
                    ratio: branch.ratio,
                    value,
                });
            }

            (
                "preference-experiment",
                RecipeArguments::Preference(PreferenceArguments {
                    slug,
                    experiment_document_url: experiment_url.to_string(),
                    preference_name: design.pref_key.clone(),
                    preference_type: pref_type.as_str().to_string(),
                    preference_branch_type: pref_branch.as_str().to_string(),
                    is_high_population: false,
                    branches,
                }),
            )
        }
        ExperimentKind::Addon => (
            "opt-out-study",
            RecipeArguments::OptOutStudy(OptOutStudyArguments {
                name: slug,
                description: content.overview.public_description.clone(),
                addon_url: content.design.addon_release_url.clone(),
                is_enrollment_paused: false,
            }),
        ),
        ExperimentKind::Generic => {
            return Err(unavailable("generic experiments are not delivered by recipe"));
        }
    };

    Ok(RecipePayload {
        action_name,
        name,
        filter_expression: filter_expression(experiment),
        comment: content.population.client_matching.clone(),
        arguments,
    })
}
