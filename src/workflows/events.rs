// Domain events emitted by successful workflow commands, and the notifier seam

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::experiment::{ChangeLogEntry, Experiment, Status, UserId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Cloned { source: String },
    StatusChanged { from: Status, to: Status },
    FieldsChanged,
    SignOffsChanged,
    Archived,
    Unarchived,
    DeliveryRecorded,
}

/// What happened to which experiment, and who should hear about it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowEvent {
    pub experiment: String,
    pub name: String,
    pub kind: EventKind,
    pub actor: UserId,
    pub summary: String,
    pub subscribers: BTreeSet<UserId>,
    pub history_entry: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

impl WorkflowEvent {
    pub(crate) fn new(
        experiment: &Experiment,
        kind: EventKind,
        actor: &UserId,
        entry: Option<&ChangeLogEntry>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let summary = match (&kind, entry) {
            (EventKind::Cloned { source }, _) => format!("Cloned from {source}"),
            (_, Some(entry)) => entry.summary(),
            (_, None) => String::new(),
        };
        Self {
            experiment: experiment.slug.clone(),
            name: experiment.name.clone(),
            kind,
            actor: actor.clone(),
            summary,
            subscribers: experiment.subscribers.clone(),
            history_entry: entry.map(|e| e.id),
            occurred_at,
        }
    }

    /// Everyone who should be told, excluding the person who made the change
    pub fn recipients(&self) -> impl Iterator<Item = &UserId> {
        self.subscribers.iter().filter(move |u| *u != &self.actor)
    }
}

/// Delivery of workflow events to interested parties (email, chat, ...)
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &WorkflowEvent);
}

/// Writes every event to the structured log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &WorkflowEvent) {
        info!(
            experiment = %event.experiment,
            actor = %event.actor,
            kind = ?event.kind,
            recipients = event.recipients().count(),
            "{}",
            event.summary
        );
    }
}

/// Fans events out to in-process subscribers
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, event: &WorkflowEvent) {
        // No receivers is not an error; the event is simply dropped
        match self.tx.send(event.clone()) {
            Ok(n) => debug!(experiment = %event.experiment, receivers = n, "Event broadcast"),
            Err(_) => debug!(experiment = %event.experiment, "No event receivers"),
        }
    }
}
