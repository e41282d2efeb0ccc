// Shared builders for integration tests
#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use experiment_workflow::experiment::signoff::ALWAYS_REQUIRED;
use experiment_workflow::experiment::types::{
    Design, Objectives, Overview, Population, Risks, Testing, Timeline,
};
use experiment_workflow::experiment::{
    Branch, Channel, Experiment, ExperimentKind, ExperimentUpdate, FirefoxVersion, Permission,
    PrefBranch, PrefType, RiskQuestion, SignOff,
};
use experiment_workflow::workflows::FixedClock;
use experiment_workflow::{
    Actor, BroadcastNotifier, ExperimentService, ExperimentStore, MemoryExperimentStore,
    WorkflowEngine, WorkflowMetrics,
};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn engine() -> WorkflowEngine {
    WorkflowEngine::default().with_clock(Arc::new(FixedClock(now())))
}

pub fn owner() -> Actor {
    Actor::new("owner@example.com")
}

/// Holds both gated permissions
pub fn release_manager() -> Actor {
    Actor::new("relman@example.com")
        .with_permission(Permission::QaSignOff)
        .with_permission(Permission::RelmanSignOff)
}

pub struct TestHarness {
    pub service: ExperimentService,
    pub store: Arc<MemoryExperimentStore>,
    pub notifier: Arc<BroadcastNotifier>,
    pub metrics: &'static WorkflowMetrics,
}

pub fn harness() -> TestHarness {
    harness_with_store(Arc::new(MemoryExperimentStore::new()))
}

pub fn harness_with_store(store: Arc<MemoryExperimentStore>) -> TestHarness {
    let notifier = Arc::new(BroadcastNotifier::default());
    let metrics: &'static WorkflowMetrics = Box::leak(Box::new(WorkflowMetrics::new()));
    let service = ExperimentService::new(store.clone() as Arc<dyn ExperimentStore>, engine())
        .with_notifier(notifier.clone())
        .with_metrics(metrics);
    TestHarness {
        service,
        store,
        notifier,
        metrics,
    }
}

pub fn overview_update(name: &str) -> ExperimentUpdate {
    ExperimentUpdate::Overview {
        name: name.to_string(),
        owner: None,
        overview: Overview {
            short_description: "Does a bigger button get more clicks?".to_string(),
            public_name: "Bigger Button".to_string(),
            public_description: "Testing button sizes".to_string(),
            data_science_bugzilla_url: "https://bugzilla.mozilla.org/show_bug.cgi?id=1234".to_string(),
            analysis_owner: "analyst@example.com".to_string(),
            ..Default::default()
        },
    }
}

pub fn timeline_population_update() -> ExperimentUpdate {
    ExperimentUpdate::TimelinePopulation {
        timeline: Timeline {
            proposed_start_date: NaiveDate::from_ymd_opt(2024, 6, 1),
            proposed_duration: Some(30),
            proposed_enrollment: Some(7),
        },
        population: Population {
            percent: Some(10.0),
            channel: Some(Channel::Beta),
            min_version: Some(FirefoxVersion::new("60.0")),
            max_version: Some(FirefoxVersion::new("64.0")),
            client_matching: "Beta users on desktop".to_string(),
            ..Default::default()
        },
    }
}

pub fn pref_design_update() -> ExperimentUpdate {
    ExperimentUpdate::Design {
        design: Design {
            pref_key: "browser.button.size".to_string(),
            pref_type: Some(PrefType::Integer),
            pref_branch: Some(PrefBranch::Default),
            ..Default::default()
        },
    }
}

pub fn objectives_update() -> ExperimentUpdate {
    ExperimentUpdate::Objectives {
        objectives: Objectives {
            objectives: "Measure click-through".to_string(),
            analysis: "Compare CTR between branches".to_string(),
            survey_required: Some(false),
            ..Default::default()
        },
    }
}

/// Every risk answered "no" unless listed in `yes`
pub fn risks_update(yes: &[RiskQuestion]) -> ExperimentUpdate {
    ExperimentUpdate::RisksTesting {
        risks: Risks {
            answers: RiskQuestion::ALL
                .into_iter()
                .map(|q| (q, yes.contains(&q)))
                .collect(),
            technical_description: if yes.contains(&RiskQuestion::Technical) {
                "Touches the toolbar layout".to_string()
            } else {
                String::new()
            },
            ..Default::default()
        },
        testing: Testing {
            qa_status: "Green".to_string(),
            ..Default::default()
        },
    }
}

pub fn pref_branches(control_ratio: u8, treatment_ratio: u8) -> Vec<Branch> {
    vec![
        Branch::control("Control", control_ratio)
            .with_description("Current size")
            .with_value("1"),
        Branch::new("Treatment", treatment_ratio)
            .with_description("Twice the size")
            .with_value("2"),
    ]
}

/// A pref experiment with every required section filled in, still in Draft
pub async fn ready_pref_experiment(h: &TestHarness, name: &str) -> Experiment {
    let actor = owner();
    let exp = h
        .service
        .create(name, ExperimentKind::Pref, &actor)
        .await
        .unwrap();
    let slug = exp.slug.clone();
    for update in [
        overview_update(name),
        timeline_population_update(),
        pref_design_update(),
        objectives_update(),
        risks_update(&[]),
    ] {
        h.service.update(&slug, &actor, update).await.unwrap();
    }
    h.service
        .set_branches(&slug, &actor, pref_branches(50, 50))
        .await
        .unwrap()
}

pub fn all_required_sign_offs() -> BTreeMap<SignOff, bool> {
    ALWAYS_REQUIRED.into_iter().map(|s| (s, true)).collect()
}
