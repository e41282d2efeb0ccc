// Per-section edit payloads, one per edit form

use serde::{Deserialize, Serialize};

use super::types::{
    Design, ExperimentContent, Objectives, Overview, Population, Results, Risks, Testing, Timeline,
    UserId,
};

/// A patch replacing one section group of an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "section", rename_all = "snake_case")]
pub enum ExperimentUpdate {
    Overview {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<UserId>,
        #[serde(flatten)]
        overview: Overview,
    },
    TimelinePopulation {
        timeline: Timeline,
        population: Population,
    },
    Design {
        #[serde(flatten)]
        design: Design,
    },
    Objectives {
        #[serde(flatten)]
        objectives: Objectives,
    },
    RisksTesting {
        risks: Risks,
        testing: Testing,
    },
    Results {
        #[serde(flatten)]
        results: Results,
    },
}

impl ExperimentUpdate {
    pub fn section_name(&self) -> &'static str {
        match self {
            Self::Overview { .. } => "overview",
            Self::TimelinePopulation { .. } => "timeline_population",
            Self::Design { .. } => "design",
            Self::Objectives { .. } => "objectives",
            Self::RisksTesting { .. } => "risks_testing",
            Self::Results { .. } => "results",
        }
    }

    /// Write the patched content. Name and owner are handled by the caller.
    pub(crate) fn apply_content(self, content: &mut ExperimentContent) {
        match self {
            Self::Overview { overview, .. } => content.overview = overview,
            Self::TimelinePopulation {
                timeline,
                population,
            } => {
                content.timeline = timeline;
                content.population = population;
            }
            Self::Design { design } => content.design = design,
            Self::Objectives { objectives } => content.objectives = objectives,
            Self::RisksTesting { risks, testing } => {
                content.risks = risks;
                content.testing = testing;
            }
            Self::Results { results } => content.results = results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_parses_from_tagged_json() {
        let raw = r#"{
            "section": "overview",
            "name": "Bigger Button",
            "short_description": "Make it bigger",
            "public_name": "Button test"
        }"#;
        let update: ExperimentUpdate = serde_json::from_str(raw).unwrap();
        match &update {
            ExperimentUpdate::Overview { name, owner, overview } => {
                assert_eq!(name, "Bigger Button");
                assert!(owner.is_none());
                assert_eq!(overview.short_description, "Make it bigger");
                assert!(overview.analysis_owner.is_empty());
            }
            other => panic!("unexpected update {other:?}"),
        }
        assert_eq!(update.section_name(), "overview");
    }

    #[test]
    fn test_apply_replaces_section_only() {
        let mut content = ExperimentContent::default();
        content.results.url = "https://example.com/results".to_string();
        let update = ExperimentUpdate::Objectives {
            objectives: Objectives {
                objectives: "Learn things".to_string(),
                ..Default::default()
            },
        };
        update.apply_content(&mut content);
        assert_eq!(content.objectives.objectives, "Learn things");
        assert_eq!(content.results.url, "https://example.com/results");
    }
}
