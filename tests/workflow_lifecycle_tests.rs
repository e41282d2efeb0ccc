// End-to-end workflow scenarios through the service layer

mod fixtures;

use async_trait::async_trait;
use std::collections::BTreeMap;

use experiment_workflow::delivery::{DeliveryClient, DeliveryError, RecipeStatus};
use experiment_workflow::experiment::{ExperimentKind, RiskQuestion, SignOff, Status, UserId};
use experiment_workflow::workflows::{Actor, EventKind};
use experiment_workflow::{ExperimentStore, WorkflowError};
use fixtures::*;

/// Answers every lookup with the same recipe state
struct StubDelivery(RecipeStatus);

#[async_trait]
impl DeliveryClient for StubDelivery {
    async fn recipe_status(&self, recipe_id: u64) -> Result<RecipeStatus, DeliveryError> {
        Ok(RecipeStatus {
            recipe_id,
            ..self.0.clone()
        })
    }
}

async fn in_review(h: &TestHarness) -> String {
    let exp = ready_pref_experiment(h, "Bigger Button").await;
    h.service
        .advance(&exp.slug, Status::Review, &owner())
        .await
        .unwrap();
    exp.slug
}

async fn shipped(h: &TestHarness) -> String {
    let slug = in_review(h).await;
    h.service
        .set_sign_offs(&slug, &release_manager(), &all_required_sign_offs())
        .await
        .unwrap();
    h.service.advance(&slug, Status::Ship, &owner()).await.unwrap();
    slug
}

#[tokio::test]
async fn test_ratio_total_below_hundred_blocks_review() {
    let h = harness();
    let exp = ready_pref_experiment(&h, "Bigger Button").await;
    let exp = h
        .service
        .set_branches(&exp.slug, &owner(), pref_branches(70, 20))
        .await
        .unwrap();
    let history_before = exp.history.len();

    let err = h
        .service
        .advance(&exp.slug, Status::Review, &owner())
        .await
        .unwrap_err();
    match err {
        WorkflowError::SectionsIncomplete { sections } => {
            assert_eq!(sections.len(), 1);
            assert_eq!(sections[0].section.as_str(), "branches");
        }
        other => panic!("unexpected error {other:?}"),
    }

    let stored = h.store.load(&exp.slug).await.unwrap();
    assert_eq!(stored.status, Status::Draft);
    assert_eq!(stored.version, exp.version);
    assert_eq!(stored.history.len(), history_before);
}

#[tokio::test]
async fn test_each_mutation_appends_exactly_one_entry() {
    let h = harness();
    let actor = owner();
    let exp = h
        .service
        .create("Bigger Button", ExperimentKind::Pref, &actor)
        .await
        .unwrap();
    assert_eq!(exp.history.len(), 1);

    let updates = [
        overview_update("Bigger Button"),
        timeline_population_update(),
        pref_design_update(),
        objectives_update(),
        risks_update(&[]),
    ];
    let count = updates.len();
    for update in updates {
        h.service.update(&exp.slug, &actor, update).await.unwrap();
    }
    let exp = h.store.load(&exp.slug).await.unwrap();
    assert_eq!(exp.history.len(), 1 + count);

    // Re-submitting identical content records nothing
    let again = h
        .service
        .update(&exp.slug, &actor, pref_design_update())
        .await
        .unwrap();
    assert_eq!(again.history.len(), 1 + count);
    assert_eq!(again.version, exp.version);

    let ids: Vec<u64> = again.history.entries().iter().map(|e| e.id).collect();
    assert_eq!(ids, (1..=again.history.len() as u64).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_leaving_review_needs_required_sign_offs() {
    let h = harness();
    let slug = in_review(&h).await;

    let err = h
        .service
        .advance(&slug, Status::Ship, &owner())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::SignOffIncomplete { .. }));

    // Owner can set ungated sign-offs only
    let (exp, denied) = h
        .service
        .set_sign_offs(&slug, &owner(), &all_required_sign_offs())
        .await
        .unwrap();
    assert_eq!(denied, vec![SignOff::Qa, SignOff::Relman]);
    assert!(!exp.sign_offs.contains(&SignOff::Qa));

    let gated = BTreeMap::from([(SignOff::Qa, true), (SignOff::Relman, true)]);
    let (_, denied) = h
        .service
        .set_sign_offs(&slug, &release_manager(), &gated)
        .await
        .unwrap();
    assert!(denied.is_empty());

    let exp = h.service.advance(&slug, Status::Ship, &owner()).await.unwrap();
    assert_eq!(exp.status, Status::Ship);
    assert_eq!(
        exp.delivery.slug.as_deref(),
        Some("pref-bigger-button-beta-60.0-64.0")
    );
}

#[tokio::test]
async fn test_risk_answers_pull_in_optional_sign_offs() {
    let h = harness();
    let exp = ready_pref_experiment(&h, "Partner Button").await;
    h.service
        .update(&exp.slug, &owner(), risks_update(&[RiskQuestion::PartnerRelated]))
        .await
        .unwrap();
    h.service
        .advance(&exp.slug, Status::Review, &owner())
        .await
        .unwrap();
    h.service
        .set_sign_offs(&exp.slug, &release_manager(), &all_required_sign_offs())
        .await
        .unwrap();

    let err = h
        .service
        .advance(&exp.slug, Status::Ship, &owner())
        .await
        .unwrap_err();
    match err {
        WorkflowError::SignOffIncomplete { missing } => {
            assert!(missing.contains(&SignOff::Legal));
            assert!(missing.contains(&SignOff::Vp));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_delivery_sync_walks_to_live_and_complete() {
    let h = harness();
    let slug = shipped(&h).await;
    h.service
        .record_delivery(&slug, &owner(), 501, vec![502])
        .await
        .unwrap();

    let launched = StubDelivery(RecipeStatus {
        approved: true,
        enabled: true,
        enabled_by: Some(UserId::new("launcher@example.com")),
        ..Default::default()
    });
    let exp = h
        .service
        .sync_delivery(&slug, &launched, &owner())
        .await
        .unwrap();
    assert_eq!(exp.status, Status::Live);

    let entries = exp.history.entries();
    let accepted = &entries[entries.len() - 2];
    let live = &entries[entries.len() - 1];
    assert_eq!(accepted.new_status, Status::Accepted);
    assert_eq!(accepted.changed_by, UserId::new("owner@example.com"));
    assert_eq!(live.new_status, Status::Live);
    assert_eq!(live.changed_by, UserId::new("launcher@example.com"));

    let err = h
        .service
        .set_archived(&slug, true, &owner())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotArchivable { status: Status::Live }));

    let ended = StubDelivery(RecipeStatus {
        approved: true,
        enabled: false,
        ..Default::default()
    });
    let exp = h.service.sync_delivery(&slug, &ended, &owner()).await.unwrap();
    assert_eq!(exp.status, Status::Complete);

    let exp = h.service.set_archived(&slug, true, &owner()).await.unwrap();
    assert!(exp.archived);
    assert_eq!(exp.history.latest().unwrap().message, "Archived Experiment");
}

#[tokio::test]
async fn test_paused_enrollment_is_recorded_once() {
    let h = harness();
    let slug = shipped(&h).await;
    h.service
        .record_delivery(&slug, &owner(), 501, Vec::new())
        .await
        .unwrap();

    let paused = StubDelivery(RecipeStatus {
        approved: false,
        enrollment_paused: true,
        ..Default::default()
    });
    let exp = h.service.sync_delivery(&slug, &paused, &owner()).await.unwrap();
    assert!(exp.delivery.enrollment_paused);
    assert_eq!(exp.status, Status::Ship);
    assert_eq!(exp.history.latest().unwrap().message, "Enrollment paused");

    let len = exp.history.len();
    let exp = h.service.sync_delivery(&slug, &paused, &owner()).await.unwrap();
    assert_eq!(exp.history.len(), len);
}

#[tokio::test]
async fn test_events_reach_subscribers_except_actor() {
    let h = harness();
    let mut events = h.notifier.subscribe();
    let exp = ready_pref_experiment(&h, "Bigger Button").await;
    let watcher = fixtures::release_manager();
    h.service.subscribe(&exp.slug, &watcher).await.unwrap();
    h.service.subscribe(&exp.slug, &owner()).await.unwrap();

    // Drain creation and edit events
    while events.try_recv().is_ok() {}

    h.service
        .advance(&exp.slug, Status::Review, &owner())
        .await
        .unwrap();
    let event = events.recv().await.unwrap();
    assert_eq!(
        event.kind,
        EventKind::StatusChanged {
            from: Status::Draft,
            to: Status::Review
        }
    );
    let recipients: Vec<&UserId> = event.recipients().collect();
    assert_eq!(recipients, vec![&watcher.user]);
    assert_eq!(h.metrics.get_stats().transitions, 1);
}

#[tokio::test]
async fn test_clone_of_archived_name_gets_suffix() {
    let h = harness();
    let exp = ready_pref_experiment(&h, "Bigger Button").await;
    h.service.set_archived(&exp.slug, true, &owner()).await.unwrap();

    let copier = fixtures::release_manager();
    let copy = h
        .service
        .clone_experiment(&exp.slug, "Bigger Button", &copier)
        .await
        .unwrap();
    assert_eq!(copy.slug, "bigger-button-2");
    assert_eq!(copy.status, Status::Draft);
    assert_eq!(copy.owner, copier.user);
    assert_eq!(copy.content, h.store.load(&exp.slug).await.unwrap().content);
    assert_eq!(copy.history.len(), 1);
    assert!(copy.sign_offs.is_empty());

    let err = h
        .service
        .clone_experiment(&exp.slug, "Bigger Button 2", &copier)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::DuplicateName { .. }));
}

#[tokio::test]
async fn test_clone_of_shipped_experiment_resets_workflow_state() {
    let h = harness();
    let slug = shipped(&h).await;
    h.service
        .record_delivery(&slug, &owner(), 555, vec![556])
        .await
        .unwrap();
    let watcher = Actor::new("watcher@example.com");
    h.service.subscribe(&slug, &watcher).await.unwrap();
    h.service.set_archived(&slug, true, &owner()).await.unwrap();

    let source = h.store.load(&slug).await.unwrap();
    assert!(!source.sign_offs.is_empty());
    assert!(source.is_subscribed(&watcher.user));
    assert!(source.archived);
    assert_eq!(source.delivery.recipe_id, Some(555));
    assert!(source.delivery.slug.is_some());

    let copier = release_manager();
    let copy = h
        .service
        .clone_experiment(&slug, "Bigger Button Redux", &copier)
        .await
        .unwrap();
    assert_eq!(copy.slug, "bigger-button-redux");
    assert_eq!(copy.kind, source.kind);
    assert_eq!(copy.content, source.content);
    assert_eq!(copy.status, Status::Draft);
    assert_eq!(copy.owner, copier.user);
    assert_eq!(copy.history.len(), 1);
    assert!(copy.sign_offs.is_empty());
    assert!(copy.subscribers.is_empty());
    assert!(!copy.archived);
    assert_eq!(copy.delivery.slug, None);
    assert_eq!(copy.delivery.recipe_id, None);
    assert!(copy.delivery.other_recipe_ids.is_empty());
}
