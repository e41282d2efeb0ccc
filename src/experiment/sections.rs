// Section completeness: kind -> ordered list of section checks

use serde::Serialize;
use std::fmt;

use super::branches::branch_issues;
use super::types::{Experiment, ExperimentKind, RiskQuestion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Overview,
    Timeline,
    Population,
    Design,
    Addon,
    Branches,
    Objectives,
    Analysis,
    Risks,
    Testing,
    Results,
    Normandy,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Timeline => "timeline",
            Self::Population => "population",
            Self::Design => "design",
            Self::Addon => "addon",
            Self::Branches => "branches",
            Self::Objectives => "objectives",
            Self::Analysis => "analysis",
            Self::Risks => "risks",
            Self::Testing => "testing",
            Self::Results => "results",
            Self::Normandy => "normandy",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionReport {
    pub section: Section,
    pub required: bool,
    pub complete: bool,
    /// Field names (or short problem descriptions) keeping the section incomplete
    pub missing: Vec<String>,
}

impl fmt::Display for SectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.missing.is_empty() {
            write!(f, "{}", self.section)
        } else {
            write!(f, "{} ({})", self.section, self.missing.join(", "))
        }
    }
}

const PREF_SECTIONS: &[Section] = &[
    Section::Overview,
    Section::Timeline,
    Section::Population,
    Section::Design,
    Section::Branches,
    Section::Objectives,
    Section::Analysis,
    Section::Risks,
    Section::Testing,
];

const ADDON_SECTIONS: &[Section] = &[
    Section::Overview,
    Section::Timeline,
    Section::Population,
    Section::Addon,
    Section::Branches,
    Section::Objectives,
    Section::Analysis,
    Section::Risks,
    Section::Testing,
];

/// Sections that must be complete before an experiment of this kind enters Review
pub fn required_sections(kind: ExperimentKind) -> &'static [Section] {
    match kind {
        ExperimentKind::Pref | ExperimentKind::Generic => PREF_SECTIONS,
        ExperimentKind::Addon => ADDON_SECTIONS,
    }
}

/// Every section shown for this kind, required ones first
pub fn sections_for(kind: ExperimentKind) -> Vec<Section> {
    let mut sections = required_sections(kind).to_vec();
    sections.push(Section::Results);
    if kind.uses_delivery() {
        sections.push(Section::Normandy);
    }
    sections
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn require(missing: &mut Vec<String>, field: &str, present: bool) {
    if !present {
        missing.push(field.to_string());
    }
}

/// Missing fields for a single section; empty means complete
pub fn missing_fields(experiment: &Experiment, section: Section) -> Vec<String> {
    let c = &experiment.content;
    let mut missing = Vec::new();
    let m = &mut missing;

    match section {
        Section::Overview => {
            require(m, "short_description", !blank(&c.overview.short_description));
            require(m, "public_name", !blank(&c.overview.public_name));
            require(m, "public_description", !blank(&c.overview.public_description));
            require(m, "analysis_owner", !blank(&c.overview.analysis_owner));
            require(
                m,
                "data_science_bugzilla_url",
                !blank(&c.overview.data_science_bugzilla_url),
            );
        }
        Section::Timeline => {
            require(m, "proposed_start_date", c.timeline.proposed_start_date.is_some());
            require(m, "proposed_duration", c.timeline.proposed_duration.is_some());
            require(m, "proposed_enrollment", c.timeline.proposed_enrollment.is_some());
        }
        Section::Population => {
            require(m, "population_percent", c.population.percent.is_some());
            require(m, "firefox_channel", c.population.channel.is_some());
            require(m, "firefox_min_version", c.population.min_version.is_some());
            require(m, "client_matching", !blank(&c.population.client_matching));
        }
        Section::Design => match experiment.kind {
            ExperimentKind::Pref => {
                require(m, "pref_key", !blank(&c.design.pref_key));
                require(m, "pref_type", c.design.pref_type.is_some());
                require(m, "pref_branch", c.design.pref_branch.is_some());
            }
            _ => require(m, "design", !blank(&c.design.design)),
        },
        Section::Addon => {
            require(m, "addon_experiment_id", !blank(&c.design.addon_experiment_id));
            require(m, "addon_release_url", !blank(&c.design.addon_release_url));
        }
        Section::Branches => {
            m.extend(branch_issues(
                &c.branches,
                experiment.kind,
                c.design.pref_type,
            ));
        }
        Section::Objectives => {
            require(m, "objectives", !blank(&c.objectives.objectives));
        }
        Section::Analysis => {
            require(m, "analysis", !blank(&c.objectives.analysis));
            require(m, "survey_required", c.objectives.survey_required.is_some());
            if c.objectives.survey_required == Some(true) {
                require(m, "survey_urls", !blank(&c.objectives.survey_urls));
                require(m, "survey_instructions", !blank(&c.objectives.survey_instructions));
            }
        }
        Section::Risks => {
            for question in c.risks.unanswered() {
                m.push(question.field_name().to_string());
            }
            if c.risks.is_yes(RiskQuestion::Technical) {
                require(
                    m,
                    "risk_technical_description",
                    !blank(&c.risks.technical_description),
                );
            }
        }
        Section::Testing => {
            require(m, "qa_status", !blank(&c.testing.qa_status));
        }
        Section::Results => {
            require(m, "results_url", !blank(&c.results.url));
            require(m, "results_initial", !blank(&c.results.initial));
            require(m, "results_lessons_learned", !blank(&c.results.lessons_learned));
        }
        Section::Normandy => {
            require(m, "normandy_id", experiment.delivery.recipe_id.is_some());
        }
    }
    missing
}

pub fn is_complete(experiment: &Experiment, section: Section) -> bool {
    missing_fields(experiment, section).is_empty()
}

/// Report for every section shown for the experiment's kind
pub fn section_reports(experiment: &Experiment) -> Vec<SectionReport> {
    let required = required_sections(experiment.kind);
    sections_for(experiment.kind)
        .into_iter()
        .map(|section| {
            let missing = missing_fields(experiment, section);
            SectionReport {
                section,
                required: required.contains(&section),
                complete: missing.is_empty(),
                missing,
            }
        })
        .collect()
}

/// Required sections that are not yet complete, in display order
pub fn incomplete_required(experiment: &Experiment) -> Vec<SectionReport> {
    section_reports(experiment)
        .into_iter()
        .filter(|r| r.required && !r.complete)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::types::{Branch, UserId};
    use chrono::Utc;

    fn experiment(kind: ExperimentKind) -> Experiment {
        Experiment::new(
            "exp".to_string(),
            "Exp",
            kind,
            UserId::new("owner@example.com"),
            Utc::now(),
        )
    }

    #[test]
    fn test_required_sections_by_kind() {
        assert!(required_sections(ExperimentKind::Pref).contains(&Section::Design));
        assert!(!required_sections(ExperimentKind::Pref).contains(&Section::Addon));
        assert!(required_sections(ExperimentKind::Addon).contains(&Section::Addon));
        assert!(!required_sections(ExperimentKind::Addon).contains(&Section::Design));
        for kind in ExperimentKind::ALL {
            assert!(!required_sections(kind).contains(&Section::Results));
            assert!(!required_sections(kind).contains(&Section::Normandy));
        }
        assert!(!sections_for(ExperimentKind::Generic).contains(&Section::Normandy));
    }

    #[test]
    fn test_new_experiment_incomplete_sections() {
        let exp = experiment(ExperimentKind::Generic);
        let incomplete: Vec<Section> = incomplete_required(&exp).iter().map(|r| r.section).collect();
        // Seeded control branch without a description still leaves branches incomplete
        assert!(incomplete.contains(&Section::Branches));
        assert!(incomplete.contains(&Section::Overview));
        assert!(incomplete.contains(&Section::Risks));
    }

    #[test]
    fn test_design_rules_depend_on_kind() {
        let mut pref = experiment(ExperimentKind::Pref);
        pref.content.design.design = "Some design".to_string();
        assert_eq!(
            missing_fields(&pref, Section::Design),
            vec!["pref_key", "pref_type", "pref_branch"]
        );

        let mut generic = experiment(ExperimentKind::Generic);
        assert_eq!(missing_fields(&generic, Section::Design), vec!["design"]);
        generic.content.design.design = "Some design".to_string();
        assert!(is_complete(&generic, Section::Design));
    }

    #[test]
    fn test_analysis_requires_survey_details_when_survey_required() {
        let mut exp = experiment(ExperimentKind::Generic);
        exp.content.objectives.analysis = "Look at retention".to_string();
        exp.content.objectives.survey_required = Some(true);
        assert_eq!(
            missing_fields(&exp, Section::Analysis),
            vec!["survey_urls", "survey_instructions"]
        );
        exp.content.objectives.survey_required = Some(false);
        assert!(is_complete(&exp, Section::Analysis));
    }

    #[test]
    fn test_technical_risk_needs_description() {
        let mut exp = experiment(ExperimentKind::Generic);
        for q in RiskQuestion::ALL {
            exp.content.risks.answers.insert(q, false);
        }
        assert!(is_complete(&exp, Section::Risks));
        exp.content.risks.answers.insert(RiskQuestion::Technical, true);
        assert_eq!(
            missing_fields(&exp, Section::Risks),
            vec!["risk_technical_description"]
        );
    }

    #[test]
    fn test_branch_ratio_sum_keeps_section_incomplete() {
        let mut exp = experiment(ExperimentKind::Generic);
        exp.content.branches = vec![
            Branch::control("Control", 70).with_description("Current"),
            Branch::new("Treatment", 20).with_description("New"),
        ];
        assert!(!is_complete(&exp, Section::Branches));
        exp.content.branches[1].ratio = 30;
        assert!(is_complete(&exp, Section::Branches));
    }
}
