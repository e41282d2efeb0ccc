// Field-level validation applied before any edit is committed

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use super::types::{
    slugify, Branch, ExperimentKind, Overview, Population, Risks, RiskQuestion, Timeline,
};

static BUGZILLA_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"id=(\d+)").expect("static regex"));

/// Tunable limits for field validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    pub bugzilla_host: String,
    /// Longest allowed experiment, in days
    pub max_duration: u32,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            bugzilla_host: "https://bugzilla.mozilla.org/".to_string(),
            max_duration: 1000,
        }
    }
}

/// Field name -> messages, collected so a caller sees every problem at once
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// `Ok(())` when nothing was collected
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(" ")))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

pub fn bugzilla_id(url: &str) -> Option<u64> {
    BUGZILLA_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn validate_name(name: &str, errors: &mut ValidationErrors) {
    if name.trim().is_empty() {
        errors.add("name", "This field is required.");
    } else if slugify(name).is_empty() {
        errors.add("name", "This name must include non-punctuation characters.");
    }
}

fn validate_bugzilla_url(field: &str, url: &str, rules: &ValidationRules, errors: &mut ValidationErrors) {
    if url.trim().is_empty() {
        return;
    }
    if !url.contains(&rules.bugzilla_host) || bugzilla_id(url).is_none() {
        errors.add(
            field,
            format!(
                "Please Provide a Valid URL ex: {}show_bug.cgi?id=1234",
                rules.bugzilla_host
            ),
        );
    }
}

pub fn validate_overview(overview: &Overview, rules: &ValidationRules, errors: &mut ValidationErrors) {
    validate_bugzilla_url(
        "data_science_bugzilla_url",
        &overview.data_science_bugzilla_url,
        rules,
        errors,
    );
    validate_bugzilla_url("feature_bugzilla_url", &overview.feature_bugzilla_url, rules, errors);
}

/// `previous_start` is the currently stored start date; an unchanged past date is accepted
pub fn validate_timeline(
    timeline: &Timeline,
    previous_start: Option<NaiveDate>,
    today: NaiveDate,
    rules: &ValidationRules,
    errors: &mut ValidationErrors,
) {
    if let Some(start) = timeline.proposed_start_date {
        if Some(start) != previous_start && start < today {
            errors.add(
                "proposed_start_date",
                "The experiment start date must be no earlier than the current date.",
            );
        }
    }
    if let Some(duration) = timeline.proposed_duration {
        if duration == 0 || duration > rules.max_duration {
            errors.add(
                "proposed_duration",
                format!("The duration must be between 1 and {} days.", rules.max_duration),
            );
        }
    }
    if let Some(enrollment) = timeline.proposed_enrollment {
        if enrollment > rules.max_duration {
            errors.add(
                "proposed_enrollment",
                format!("The enrollment must be at most {} days.", rules.max_duration),
            );
        }
        if let Some(duration) = timeline.proposed_duration {
            if enrollment > duration {
                errors.add(
                    "proposed_enrollment",
                    "Enrollment duration is optional, but if set, must be lower than the experiment duration.",
                );
            }
        }
    }
}

pub fn validate_population(population: &Population, errors: &mut ValidationErrors) {
    if let Some(percent) = population.percent {
        if !(percent > 0.0 && percent <= 100.0) {
            errors.add(
                "population_percent",
                "The population size must be between 0 and 100 percent.",
            );
        }
    }
    if let (Some(min), Some(max)) = (&population.min_version, &population.max_version) {
        match (min.major(), max.major()) {
            (Some(min), Some(max)) if max > min => {}
            _ => errors.add(
                "firefox_max_version",
                "The max version must be larger than the min version.",
            ),
        }
    }
}

pub fn validate_risks(risks: &Risks, errors: &mut ValidationErrors) {
    if risks.is_yes(RiskQuestion::Technical) && risks.technical_description.trim().is_empty() {
        errors.add(
            "risk_technical_description",
            "When the technical risk is yes, this field is required.",
        );
    }
}

/// Edit-time checks for a replacement branch list; the ratio total is left to completeness
pub fn validate_branches(branches: &[Branch], kind: ExperimentKind, errors: &mut ValidationErrors) {
    if branches.is_empty() {
        errors.add("variants", "An experiment must have at least one branch.");
        return;
    }
    if branches.iter().filter(|b| b.is_control).count() != 1 {
        errors.add("variants", "Exactly one branch must be the control.");
    }
    for branch in branches {
        if branch.name.trim().is_empty() || slugify(&branch.name).is_empty() {
            errors.add("name", "This name must include non-punctuation characters.");
        }
        if branch.ratio == 0 || branch.ratio > 100 {
            errors.add(
                "ratio",
                format!("Branch ratio for {:?} must be between 1 and 100.", branch.name),
            );
        }
        if kind == ExperimentKind::Pref {
            if let Some(value) = branch.value.as_deref().filter(|v| !v.trim().is_empty()) {
                if serde_json::from_str::<serde_json::Value>(value).is_err() {
                    errors.add("value", "This is not valid JSON.");
                }
            }
        }
    }
}

/// Primary recipe id plus the others; all positive, no duplicates
pub fn validate_recipe_ids(primary: u64, others: &[u64], errors: &mut ValidationErrors) {
    if primary == 0 {
        errors.add("normandy_id", "Recipe IDs must be positive numbers.");
    }
    if others.iter().any(|id| *id == 0) {
        errors.add("other_normandy_ids", "Recipe IDs must be positive numbers.");
    }
    if others.contains(&primary) {
        errors.add("other_normandy_ids", "Duplicate IDs are not accepted.");
    }
    let mut seen = HashSet::new();
    if !others.iter().all(|id| seen.insert(*id)) {
        errors.add("other_normandy_ids", "Duplicate IDs are not accepted.");
    }
}
