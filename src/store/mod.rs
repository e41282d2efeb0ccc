// Experiment persistence with optimistic concurrency
// Stores own the version counter: insert starts at 1, every save bumps it by one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::experiment::{Experiment, ExperimentKind, ExperimentSummary, Status, UserId};

pub mod file;
pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

pub use file::FileExperimentStore;
pub use memory::MemoryExperimentStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteExperimentStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Experiment not found: {slug}")]
    NotFound { slug: String },

    #[error("Experiment already exists: {slug}")]
    AlreadyExists { slug: String },

    #[error("Concurrent modification of {slug}: expected version {expected}, found {found}")]
    ConcurrentModification {
        slug: String,
        expected: u64,
        found: u64,
    },

    #[error("Refusing to rewrite change history of {slug}")]
    HistoryRewrite { slug: String },

    #[error("Invalid experiment slug: {slug:?}")]
    InvalidSlug { slug: String },

    #[error("Lock acquisition failed: {reason}")]
    Lock { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Which experiments `list` returns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilter {
    pub include_archived: bool,
    pub status: Option<Status>,
    pub kind: Option<ExperimentKind>,
    pub owner: Option<UserId>,
    pub subscriber: Option<UserId>,
}

impl ListFilter {
    /// Everything, archived experiments included
    pub fn all() -> Self {
        Self {
            include_archived: true,
            ..Default::default()
        }
    }

    pub fn matches(&self, experiment: &Experiment) -> bool {
        (self.include_archived || !experiment.archived)
            && self.status.is_none_or(|s| s == experiment.status)
            && self.kind.is_none_or(|k| k == experiment.kind)
            && self.owner.as_ref().is_none_or(|o| o == &experiment.owner)
            && self
                .subscriber
                .as_ref()
                .is_none_or(|u| experiment.is_subscribed(u))
    }
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ExperimentStore: Send + Sync {
    /// Store a brand new experiment; returns its first version (1)
    async fn insert(&self, experiment: &Experiment) -> Result<u64, StoreError>;

    async fn load(&self, slug: &str) -> Result<Experiment, StoreError>;

    /// Replace the stored experiment if its version still equals `expected_version`.
    /// Returns the new version.
    async fn save(&self, experiment: &Experiment, expected_version: u64) -> Result<u64, StoreError>;

    /// Summaries ordered by slug
    async fn list(&self, filter: &ListFilter) -> Result<Vec<ExperimentSummary>, StoreError>;
}

/// Checks shared by every store before a save is written
pub(crate) fn check_write(
    current: &Experiment,
    incoming: &Experiment,
    expected_version: u64,
) -> Result<(), StoreError> {
    if current.version != expected_version {
        return Err(StoreError::ConcurrentModification {
            slug: current.slug.clone(),
            expected: expected_version,
            found: current.version,
        });
    }
    if !current.history.is_extended_by(&incoming.history) {
        return Err(StoreError::HistoryRewrite {
            slug: current.slug.clone(),
        });
    }
    Ok(())
}

pub(crate) fn summarize(experiments: impl IntoIterator<Item = Experiment>, filter: &ListFilter) -> Vec<ExperimentSummary> {
    let mut summaries: Vec<ExperimentSummary> = experiments
        .into_iter()
        .filter(|e| filter.matches(e))
        .map(|e| e.summary())
        .collect();
    summaries.sort_by(|a, b| a.slug.cmp(&b.slug));
    summaries
}
