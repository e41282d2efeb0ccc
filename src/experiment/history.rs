// Append-only change history and the field snapshot it is diffed from

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::signoff::SignOff;
use super::types::{Experiment, RiskQuestion, Status, UserId};

/// Old/new pair for one tracked field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub display_name: String,
}

pub type FieldDiffs = BTreeMap<String, FieldChange>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: u64,
    pub changed_by: UserId,
    pub changed_on: DateTime<Utc>,
    pub old_status: Option<Status>,
    pub new_status: Status,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub changed_values: FieldDiffs,
}

impl ChangeLogEntry {
    pub fn is_status_change(&self) -> bool {
        self.old_status != Some(self.new_status)
    }

    /// One-line description used for notifications and listings
    pub fn summary(&self) -> String {
        if !self.message.is_empty() {
            return self.message.trim().to_string();
        }
        match self.old_status {
            None => format!("Created {}", self.new_status),
            Some(old) if self.is_status_change() => {
                format!("Status changed from {} to {}", old, self.new_status)
            }
            Some(_) => {
                let fields: Vec<&str> = self
                    .changed_values
                    .values()
                    .map(|c| c.display_name.as_str())
                    .collect();
                format!("Edited {}", fields.join(", "))
            }
        }
    }
}

/// Ordered change records. Only ever grows; there is no way to edit a past entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeLog {
    entries: Vec<ChangeLogEntry>,
}

impl ChangeLog {
    pub fn append(
        &mut self,
        changed_by: UserId,
        changed_on: DateTime<Utc>,
        old_status: Option<Status>,
        new_status: Status,
        message: String,
        changed_values: FieldDiffs,
    ) -> &ChangeLogEntry {
        let id = self.entries.last().map(|e| e.id + 1).unwrap_or(1);
        self.entries.push(ChangeLogEntry {
            id,
            changed_by,
            changed_on,
            old_status,
            new_status,
            message,
            changed_values,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[ChangeLogEntry] {
        &self.entries
    }

    pub fn latest(&self) -> Option<&ChangeLogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when `newer` keeps every entry of `self` untouched and only adds to the end
    pub fn is_extended_by(&self, newer: &ChangeLog) -> bool {
        newer.entries.len() >= self.entries.len()
            && newer.entries[..self.entries.len()] == self.entries[..]
    }
}

/// Flat field → JSON value view of everything the history tracks
pub fn snapshot(experiment: &Experiment) -> BTreeMap<String, Value> {
    let c = &experiment.content;
    let mut fields: BTreeMap<String, Value> = BTreeMap::new();
    let mut put = |name: &str, value: Value| {
        fields.insert(name.to_string(), value);
    };

    put("name", json!(experiment.name));
    put("type", json!(experiment.kind));
    put("owner", json!(experiment.owner));
    put("short_description", json!(c.overview.short_description));
    put("public_name", json!(c.overview.public_name));
    put("public_description", json!(c.overview.public_description));
    put("data_science_bugzilla_url", json!(c.overview.data_science_bugzilla_url));
    put("feature_bugzilla_url", json!(c.overview.feature_bugzilla_url));
    put("related_work", json!(c.overview.related_work));
    put("related_to", json!(c.overview.related_to));
    put("engineering_owner", json!(c.overview.engineering_owner));
    put("analysis_owner", json!(c.overview.analysis_owner));

    put("proposed_start_date", json!(c.timeline.proposed_start_date));
    put("proposed_duration", json!(c.timeline.proposed_duration));
    put("proposed_enrollment", json!(c.timeline.proposed_enrollment));

    put("population_percent", json!(c.population.percent));
    put("firefox_channel", json!(c.population.channel));
    put("firefox_min_version", json!(c.population.min_version));
    put("firefox_max_version", json!(c.population.max_version));
    put("locales", json!(c.population.locales));
    put("countries", json!(c.population.countries));
    put("platform", json!(c.population.platform));
    put("client_matching", json!(c.population.client_matching));

    put("design", json!(c.design.design));
    put("pref_key", json!(c.design.pref_key));
    put("pref_type", json!(c.design.pref_type));
    put("pref_branch", json!(c.design.pref_branch));
    put("addon_experiment_id", json!(c.design.addon_experiment_id));
    put("addon_release_url", json!(c.design.addon_release_url));
    put("variants", json!(c.branches));

    put("objectives", json!(c.objectives.objectives));
    put("analysis", json!(c.objectives.analysis));
    put("survey_required", json!(c.objectives.survey_required));
    put("survey_urls", json!(c.objectives.survey_urls));
    put("survey_instructions", json!(c.objectives.survey_instructions));

    for question in RiskQuestion::ALL {
        put(question.field_name(), json!(c.risks.answer(question)));
    }
    put("risk_technical_description", json!(c.risks.technical_description));
    put("risks", json!(c.risks.notes));
    put("testing", json!(c.testing.instructions));
    put("test_builds", json!(c.testing.builds));
    put("qa_status", json!(c.testing.qa_status));

    put("results_url", json!(c.results.url));
    put("results_initial", json!(c.results.initial));
    put("results_lessons_learned", json!(c.results.lessons_learned));

    for sign_off in SignOff::ALL {
        put(sign_off.field_name(), json!(experiment.sign_offs.contains(&sign_off)));
    }

    put("normandy_id", json!(experiment.delivery.recipe_id));
    put("other_normandy_ids", json!(experiment.delivery.other_recipe_ids));
    put("normandy_slug", json!(experiment.delivery.slug));
    put("is_paused", json!(experiment.delivery.enrollment_paused));
    put("archived", json!(experiment.archived));

    fields
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Fields whose value differs between two snapshots. Blank → blank is not a change.
pub fn diff(before: &BTreeMap<String, Value>, after: &BTreeMap<String, Value>) -> FieldDiffs {
    let mut changes = FieldDiffs::new();
    for (field, new_value) in after {
        let old_value = before.get(field).unwrap_or(&Value::Null);
        if old_value == new_value || (is_blank(old_value) && is_blank(new_value)) {
            continue;
        }
        changes.insert(
            field.clone(),
            FieldChange {
                old_value: (!is_blank(old_value)).then(|| old_value.clone()),
                new_value: (!is_blank(new_value)).then(|| new_value.clone()),
                display_name: display_name(field),
            },
        );
    }
    changes
}

/// Label shown next to a field in change history
pub fn display_name(field: &str) -> String {
    let known = match field {
        "type" => Some("Type"),
        "short_description" => Some("Short Description"),
        "data_science_bugzilla_url" => Some("Data Science Bugzilla URL"),
        "feature_bugzilla_url" => Some("Feature Bugzilla URL"),
        "owner" => Some("Experiment Owner"),
        "engineering_owner" => Some("Engineering Owner"),
        "analysis_owner" => Some("Data Science Owner"),
        "public_description" => Some("Public Description"),
        "related_work" => Some("Related Work URLs"),
        "related_to" => Some("Related Experiments"),
        "proposed_duration" => Some("Proposed Experiment Duration (days)"),
        "proposed_enrollment" => Some("Proposed Enrollment Duration (days)"),
        "population_percent" => Some("Population Percentage"),
        "firefox_channel" => Some("Firefox Channel"),
        "client_matching" => Some("Population Filtering"),
        "variants" => Some("Branches"),
        "pref_key" => Some("Pref Name"),
        "addon_experiment_id" => Some("Active Experiment Name"),
        "addon_release_url" => Some("Signed Release URL"),
        "analysis" => Some("Analysis Plan"),
        "survey_urls" => Some("Survey URLs"),
        "survey_instructions" => Some("Survey Launch Instructions"),
        "risk_technical_description" => Some("Technical Risks Description"),
        "testing" => Some("Test Instructions"),
        "qa_status" => Some("QA Status"),
        "results_url" => Some("Primary Results URL"),
        "results_lessons_learned" => Some("Lessons Learned"),
        "normandy_id" => Some("Primary Recipe ID"),
        "other_normandy_ids" => Some("Other Recipe IDs"),
        _ => None,
    };
    if let Some(label) = known {
        return label.to_string();
    }
    if let Some(q) = RiskQuestion::ALL.iter().find(|q| q.field_name() == field) {
        return q.label().to_string();
    }
    if let Some(so) = SignOff::ALL.iter().find(|so| so.field_name() == field) {
        return so.label().to_string();
    }
    field
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Changes made by one user on one day
#[derive(Debug, Clone, PartialEq)]
pub struct UserChanges<'a> {
    pub user: &'a UserId,
    pub entries: Vec<&'a ChangeLogEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryDay<'a> {
    pub date: NaiveDate,
    pub users: Vec<UserChanges<'a>>,
}

/// History grouped by date (newest first) then by user, computed from the flat log
pub fn grouped_history(log: &ChangeLog) -> Vec<HistoryDay<'_>> {
    let mut days: Vec<HistoryDay<'_>> = Vec::new();
    for entry in log.entries().iter().rev() {
        let date = entry.changed_on.date_naive();
        if days.last().map(|d| d.date) != Some(date) {
            days.push(HistoryDay {
                date,
                users: Vec::new(),
            });
        }
        let Some(day) = days.last_mut() else {
            continue;
        };
        match day.users.iter_mut().find(|u| u.user == &entry.changed_by) {
            Some(group) => group.entries.push(entry),
            None => day.users.push(UserChanges {
                user: &entry.changed_by,
                entries: vec![entry],
            }),
        }
    }
    days
}
