use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{check_write, summarize, ExperimentStore, ListFilter, StoreError};
use crate::experiment::{Experiment, ExperimentSummary};

/// Process-local store, used by tests and embedders
#[derive(Debug, Default)]
pub struct MemoryExperimentStore {
    experiments: RwLock<HashMap<String, Experiment>>,
}

impl MemoryExperimentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExperimentStore for MemoryExperimentStore {
    async fn insert(&self, experiment: &Experiment) -> Result<u64, StoreError> {
        let mut experiments = self.experiments.write().await;
        if experiments.contains_key(&experiment.slug) {
            return Err(StoreError::AlreadyExists {
                slug: experiment.slug.clone(),
            });
        }
        let mut stored = experiment.clone();
        stored.version = 1;
        experiments.insert(stored.slug.clone(), stored);
        debug!(experiment = %experiment.slug, "Experiment inserted");
        Ok(1)
    }

    async fn load(&self, slug: &str) -> Result<Experiment, StoreError> {
        self.experiments
            .read()
            .await
            .get(slug)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                slug: slug.to_string(),
            })
    }

    async fn save(&self, experiment: &Experiment, expected_version: u64) -> Result<u64, StoreError> {
        let mut experiments = self.experiments.write().await;
        let current = experiments
            .get(&experiment.slug)
            .ok_or_else(|| StoreError::NotFound {
                slug: experiment.slug.clone(),
            })?;
        check_write(current, experiment, expected_version)?;

        let mut stored = experiment.clone();
        stored.version = expected_version + 1;
        let version = stored.version;
        experiments.insert(stored.slug.clone(), stored);
        debug!(experiment = %experiment.slug, version, "Experiment saved");
        Ok(version)
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ExperimentSummary>, StoreError> {
        let experiments = self.experiments.read().await;
        Ok(summarize(experiments.values().cloned(), filter))
    }
}
