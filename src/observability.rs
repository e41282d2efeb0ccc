use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters for workflow commands
#[derive(Debug)]
pub struct WorkflowMetrics {
    enabled: AtomicBool,
    pub commands: AtomicU64,
    pub transitions: AtomicU64,
    pub rejections: AtomicU64,
    pub history_entries: AtomicU64,
    pub conflicts: AtomicU64,
    pub notifications: AtomicU64,
}

impl Default for WorkflowMetrics {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            commands: AtomicU64::new(0),
            transitions: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            history_entries: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            notifications: AtomicU64::new(0),
        }
    }
}

impl WorkflowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn bump(&self, counter: &AtomicU64) {
        if self.enabled.load(Ordering::Relaxed) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_command(&self) {
        self.bump(&self.commands);
    }

    pub fn record_transition(&self) {
        self.bump(&self.transitions);
    }

    pub fn record_rejection(&self) {
        self.bump(&self.rejections);
    }

    pub fn record_history_entry(&self) {
        self.bump(&self.history_entries);
    }

    pub fn record_conflict(&self) {
        self.bump(&self.conflicts);
    }

    pub fn record_notification(&self) {
        self.bump(&self.notifications);
    }

    pub fn get_stats(&self) -> WorkflowStats {
        WorkflowStats {
            commands: self.commands.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            history_entries: self.history_entries.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            commands = stats.commands,
            transitions = stats.transitions,
            rejections = stats.rejections,
            history_entries = stats.history_entries,
            conflicts = stats.conflicts,
            notifications = stats.notifications,
            "Workflow metrics"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkflowStats {
    pub commands: u64,
    pub transitions: u64,
    pub rejections: u64,
    pub history_entries: u64,
    pub conflicts: u64,
    pub notifications: u64,
}

/// Global metrics instance
static WORKFLOW_METRICS: std::sync::LazyLock<WorkflowMetrics> =
    std::sync::LazyLock::new(WorkflowMetrics::new);

pub fn workflow_metrics() -> &'static WorkflowMetrics {
    &WORKFLOW_METRICS
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
