// One atomic unit per command: load -> engine -> save (version checked) -> notify

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn, Instrument};

use crate::delivery::DeliveryClient;
use crate::experiment::{
    Branch, Experiment, ExperimentKind, ExperimentSummary, ExperimentUpdate, SignOff, Status,
};
use crate::observability::{workflow_metrics, OperationTimer, WorkflowMetrics};
use crate::store::{ExperimentStore, ListFilter};
use crate::telemetry::{create_command_span, generate_correlation_id};
use crate::workflows::{
    Actor, EventKind, LogNotifier, Notifier, WorkflowEngine, WorkflowError, WorkflowEvent,
};

pub struct ExperimentService {
    store: Arc<dyn ExperimentStore>,
    notifier: Arc<dyn Notifier>,
    engine: WorkflowEngine,
    metrics: &'static WorkflowMetrics,
}

impl std::fmt::Debug for ExperimentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentService")
            .field("engine", &self.engine)
            .finish()
    }
}

impl ExperimentService {
    pub fn new(store: Arc<dyn ExperimentStore>, engine: WorkflowEngine) -> Self {
        Self {
            store,
            notifier: Arc::new(LogNotifier),
            engine,
            metrics: workflow_metrics(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_metrics(mut self, metrics: &'static WorkflowMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub async fn get(&self, slug: &str) -> Result<Experiment, WorkflowError> {
        Ok(self.store.load(slug).await?)
    }

    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<ExperimentSummary>, WorkflowError> {
        Ok(self.store.list(filter).await?)
    }

    pub async fn create(
        &self,
        name: &str,
        kind: ExperimentKind,
        actor: &Actor,
    ) -> Result<Experiment, WorkflowError> {
        let span = create_command_span("create", None, Some(actor.user.as_str()), &generate_correlation_id());
        async {
            self.metrics.record_command();
            let existing = self.store.list(&ListFilter::all()).await?;
            let (mut experiment, event) = self
                .engine
                .create(name, kind, actor, &existing)
                .inspect_err(|e| self.record_failure(e))?;
            experiment.version = self.store.insert(&experiment).await?;
            self.metrics.record_history_entry();
            self.dispatch(&[event]).await;
            Ok(experiment)
        }
        .instrument(span)
        .await
    }

    pub async fn clone_experiment(
        &self,
        source_slug: &str,
        new_name: &str,
        actor: &Actor,
    ) -> Result<Experiment, WorkflowError> {
        let span = create_command_span(
            "clone",
            Some(source_slug),
            Some(actor.user.as_str()),
            &generate_correlation_id(),
        );
        async {
            self.metrics.record_command();
            let source = self.store.load(source_slug).await?;
            let existing = self.store.list(&ListFilter::all()).await?;
            let (mut experiment, event) = self
                .engine
                .clone_experiment(&source, new_name, actor, &existing)
                .inspect_err(|e| self.record_failure(e))?;
            experiment.version = self.store.insert(&experiment).await?;
            self.metrics.record_history_entry();
            self.dispatch(&[event]).await;
            Ok(experiment)
        }
        .instrument(span)
        .await
    }

    pub async fn advance(
        &self,
        slug: &str,
        target: Status,
        actor: &Actor,
    ) -> Result<Experiment, WorkflowError> {
        self.apply(slug, "advance", actor, |engine, exp| {
            let event = engine.advance(exp, target, actor)?;
            Ok(((), event.into_iter().collect()))
        })
        .await
        .map(|(exp, ())| exp)
    }

    pub async fn set_archived(
        &self,
        slug: &str,
        archived: bool,
        actor: &Actor,
    ) -> Result<Experiment, WorkflowError> {
        self.apply(slug, "archive", actor, |engine, exp| {
            let event = engine.set_archived(exp, archived, actor)?;
            Ok(((), event.into_iter().collect()))
        })
        .await
        .map(|(exp, ())| exp)
    }

    /// Returns the experiment and whether the subscription changed
    pub async fn subscribe(&self, slug: &str, actor: &Actor) -> Result<(Experiment, bool), WorkflowError> {
        self.apply(slug, "subscribe", actor, |engine, exp| {
            Ok((engine.subscribe(exp, &actor.user), Vec::new()))
        })
        .await
    }

    pub async fn unsubscribe(&self, slug: &str, actor: &Actor) -> Result<(Experiment, bool), WorkflowError> {
        self.apply(slug, "unsubscribe", actor, |engine, exp| {
            Ok((engine.unsubscribe(exp, &actor.user), Vec::new()))
        })
        .await
    }

    pub async fn update(
        &self,
        slug: &str,
        actor: &Actor,
        update: ExperimentUpdate,
    ) -> Result<Experiment, WorkflowError> {
        let existing = self.store.list(&ListFilter::all()).await?;
        self.apply(slug, "update", actor, |engine, exp| {
            let event = engine.update(exp, actor, update, &existing)?;
            Ok(((), event.into_iter().collect()))
        })
        .await
        .map(|(exp, ())| exp)
    }

    pub async fn set_branches(
        &self,
        slug: &str,
        actor: &Actor,
        branches: Vec<Branch>,
    ) -> Result<Experiment, WorkflowError> {
        self.apply(slug, "branches", actor, |engine, exp| {
            let event = engine.set_branches(exp, actor, branches)?;
            Ok(((), event.into_iter().collect()))
        })
        .await
        .map(|(exp, ())| exp)
    }

    /// Returns the experiment and the sign-off changes dropped for lack of permission
    pub async fn set_sign_offs(
        &self,
        slug: &str,
        actor: &Actor,
        changes: &BTreeMap<SignOff, bool>,
    ) -> Result<(Experiment, Vec<SignOff>), WorkflowError> {
        self.apply(slug, "sign_off", actor, |engine, exp| {
            let outcome = engine.set_sign_offs(exp, actor, changes)?;
            Ok((outcome.denied, outcome.event.into_iter().collect()))
        })
        .await
    }

    pub async fn record_delivery(
        &self,
        slug: &str,
        actor: &Actor,
        primary: u64,
        others: Vec<u64>,
    ) -> Result<Experiment, WorkflowError> {
        self.apply(slug, "record_delivery", actor, |engine, exp| {
            let event = engine.record_delivery(exp, actor, primary, others)?;
            Ok(((), event.into_iter().collect()))
        })
        .await
        .map(|(exp, ())| exp)
    }

    /// Ask the delivery system about the experiment's primary recipe and reconcile status
    pub async fn sync_delivery(
        &self,
        slug: &str,
        client: &dyn DeliveryClient,
        actor: &Actor,
    ) -> Result<Experiment, WorkflowError> {
        let experiment = self.store.load(slug).await?;
        let Some(recipe_id) = experiment.delivery.recipe_id else {
            info!(experiment = %slug, "No recipe recorded; nothing to sync");
            return Ok(experiment);
        };
        let recipe = client.recipe_status(recipe_id).await?;
        self.apply(slug, "sync_delivery", actor, |engine, exp| {
            let events = engine.reconcile_delivery(exp, &recipe, actor)?;
            Ok(((), events))
        })
        .await
        .map(|(exp, ())| exp)
    }

    async fn apply<T, F>(
        &self,
        slug: &str,
        command: &str,
        actor: &Actor,
        run: F,
    ) -> Result<(Experiment, T), WorkflowError>
    where
        F: FnOnce(&WorkflowEngine, &mut Experiment) -> Result<(T, Vec<WorkflowEvent>), WorkflowError>,
    {
        let span = create_command_span(
            command,
            Some(slug),
            Some(actor.user.as_str()),
            &generate_correlation_id(),
        );
        async {
            let timer = OperationTimer::new(command);
            self.metrics.record_command();

            let original = self.store.load(slug).await?;
            let mut experiment = original.clone();
            let (output, events) = run(&self.engine, &mut experiment)
                .inspect_err(|e| self.record_failure(e))?;

            if experiment != original {
                experiment.version = self
                    .store
                    .save(&experiment, original.version)
                    .await
                    .map_err(WorkflowError::from)
                    .inspect_err(|e| self.record_failure(e))?;
                for _ in original.history.len()..experiment.history.len() {
                    self.metrics.record_history_entry();
                }
            }

            self.dispatch(&events).await;
            timer.finish();
            Ok((experiment, output))
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, events: &[WorkflowEvent]) {
        for event in events {
            if matches!(event.kind, EventKind::StatusChanged { .. }) {
                self.metrics.record_transition();
            }
            self.notifier.notify(event).await;
            self.metrics.record_notification();
        }
    }

    fn record_failure(&self, error: &WorkflowError) {
        match error {
            WorkflowError::ConcurrentModification { .. } => self.metrics.record_conflict(),
            WorkflowError::Store(_) | WorkflowError::Delivery(_) => {}
            _ => self.metrics.record_rejection(),
        }
        warn!(error = %error, kind = error.kind(), "Workflow command rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryExperimentStore;
    use crate::workflows::MockNotifier;

    fn metrics() -> &'static WorkflowMetrics {
        Box::leak(Box::new(WorkflowMetrics::new()))
    }

    #[tokio::test]
    async fn test_create_notifies_once() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|event| event.kind == EventKind::Created)
            .times(1)
            .returning(|_| ());

        let service = ExperimentService::new(Arc::new(MemoryExperimentStore::new()), WorkflowEngine::default())
            .with_notifier(Arc::new(notifier))
            .with_metrics(metrics());
        let exp = service
            .create("Bigger Button", ExperimentKind::Pref, &Actor::new("owner@example.com"))
            .await
            .unwrap();
        assert_eq!(exp.version, 1);
    }

    #[tokio::test]
    async fn test_rejected_command_does_not_save_or_notify() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_| ());
        let metrics = metrics();
        let store = Arc::new(MemoryExperimentStore::new());
        let service = ExperimentService::new(store.clone(), WorkflowEngine::default())
            .with_notifier(Arc::new(notifier))
            .with_metrics(metrics);
        let actor = Actor::new("owner@example.com");
        service.create("Bigger Button", ExperimentKind::Pref, &actor).await.unwrap();

        let err = service
            .advance("bigger-button", Status::Review, &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::SectionsIncomplete { .. }));
        assert_eq!(store.load("bigger-button").await.unwrap().version, 1);
        assert_eq!(metrics.get_stats().rejections, 1);
    }

    #[tokio::test]
    async fn test_subscribe_saves_without_history_or_event() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_| ());
        let service = ExperimentService::new(Arc::new(MemoryExperimentStore::new()), WorkflowEngine::default())
            .with_notifier(Arc::new(notifier))
            .with_metrics(metrics());
        let owner = Actor::new("owner@example.com");
        service.create("Bigger Button", ExperimentKind::Pref, &owner).await.unwrap();

        let watcher = Actor::new("watcher@example.com");
        let (exp, changed) = service.subscribe("bigger-button", &watcher).await.unwrap();
        assert!(changed);
        assert_eq!(exp.version, 2);
        assert_eq!(exp.history.len(), 1);

        let (exp, changed) = service.subscribe("bigger-button", &watcher).await.unwrap();
        assert!(!changed);
        assert_eq!(exp.version, 2);
    }
}
