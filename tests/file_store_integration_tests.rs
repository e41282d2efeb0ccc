// File-backed persistence shared by separate service instances

mod fixtures;

use std::sync::Arc;
use tempfile::TempDir;

use experiment_workflow::experiment::{ExperimentKind, Status, UserId};
use experiment_workflow::{
    ExperimentService, ExperimentStore, FileExperimentStore, ListFilter, StoreError, WorkflowError,
};
use fixtures::{engine, owner};

fn service_at(dir: &std::path::Path) -> (ExperimentService, Arc<FileExperimentStore>) {
    let store = Arc::new(FileExperimentStore::new(dir));
    let service = ExperimentService::new(store.clone(), engine());
    (service, store)
}

#[tokio::test]
async fn test_experiments_survive_reopening_the_store() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("experiments");

    {
        let (service, _) = service_at(&dir);
        let exp = service
            .create("Bigger Button", ExperimentKind::Addon, &owner())
            .await
            .unwrap();
        service
            .subscribe(&exp.slug, &fixtures::release_manager())
            .await
            .unwrap();
    }

    let (service, _) = service_at(&dir);
    let exp = service.get("bigger-button").await.unwrap();
    assert_eq!(exp.version, 2);
    assert_eq!(exp.kind, ExperimentKind::Addon);
    assert!(exp.is_subscribed(&UserId::new("relman@example.com")));
    assert_eq!(exp.history.len(), 1);

    let err = service
        .create("Bigger Button", ExperimentKind::Pref, &owner())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::DuplicateName { .. }));
}

#[tokio::test]
async fn test_stale_writer_is_rejected() {
    let temp = TempDir::new().unwrap();
    let (service, store) = service_at(temp.path());
    let exp = service
        .create("Bigger Button", ExperimentKind::Generic, &owner())
        .await
        .unwrap();

    let mut first = store.load(&exp.slug).await.unwrap();
    let mut second = store.load(&exp.slug).await.unwrap();

    first.archived = true;
    let version = store.save(&first, first.version).await.unwrap();
    assert_eq!(version, 2);

    second.name = "Other".to_string();
    let err = store.save(&second, second.version).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::ConcurrentModification {
            expected: 1,
            found: 2,
            ..
        }
    ));

    let stored = store.load(&exp.slug).await.unwrap();
    assert!(stored.archived);
    assert_eq!(stored.name, "Bigger Button");
}

#[tokio::test]
async fn test_history_cannot_be_rewritten() {
    let temp = TempDir::new().unwrap();
    let (service, store) = service_at(temp.path());
    let exp = service
        .create("Bigger Button", ExperimentKind::Generic, &owner())
        .await
        .unwrap();
    service
        .set_archived(&exp.slug, true, &owner())
        .await
        .unwrap();

    // A copy holding only the creation entry would drop the archive entry
    let err = store.save(&exp, 2).await.unwrap_err();
    assert!(matches!(err, StoreError::HistoryRewrite { .. }));
}

#[tokio::test]
async fn test_list_filters_archived_and_status() {
    let temp = TempDir::new().unwrap();
    let (service, _) = service_at(temp.path());
    for name in ["Alpha", "Beta Test", "Gamma"] {
        service
            .create(name, ExperimentKind::Generic, &owner())
            .await
            .unwrap();
    }
    service.set_archived("gamma", true, &owner()).await.unwrap();

    let visible = service.list(&ListFilter::default()).await.unwrap();
    let slugs: Vec<&str> = visible.iter().map(|s| s.slug.as_str()).collect();
    assert_eq!(slugs, vec!["alpha", "beta-test"]);

    let all = service.list(&ListFilter::all()).await.unwrap();
    assert_eq!(all.len(), 3);

    let drafts = service
        .list(&ListFilter {
            status: Some(Status::Review),
            ..ListFilter::all()
        })
        .await
        .unwrap();
    assert!(drafts.is_empty());
}

#[tokio::test]
async fn test_missing_experiment_maps_to_not_found() {
    let temp = TempDir::new().unwrap();
    let (service, _) = service_at(temp.path());
    let err = service
        .advance("nope", Status::Review, &owner())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { .. }));
}
