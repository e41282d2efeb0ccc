// JSON-file store: one pretty-printed file per experiment slug.
// Writes go through a tmp file + rename while holding an fd-lock on the
// directory's lock file, so separate processes cannot interleave a
// read-compare-write.

use async_trait::async_trait;
use fd_lock::RwLock as FileLock;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{check_write, summarize, ExperimentStore, ListFilter, StoreError};
use crate::experiment::{slugify, Experiment, ExperimentSummary};

const LOCK_FILE: &str = ".experiments.lock";

#[derive(Debug)]
pub struct FileExperimentStore {
    root: PathBuf,
    // Serializes writers inside this process; fd-lock handles other processes
    writer: Mutex<()>,
}

impl FileExperimentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Only canonical slugs map to a file, so a slug can never name a path outside `root`
    fn experiment_path(&self, slug: &str) -> Result<PathBuf, StoreError> {
        if slug.is_empty() || slugify(slug) != slug {
            return Err(StoreError::InvalidSlug {
                slug: slug.to_string(),
            });
        }
        Ok(self.root.join(format!("{slug}.json")))
    }

    async fn ensure_root(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    fn open_lock(&self) -> Result<FileLock<std::fs::File>, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.root.join(LOCK_FILE))?;
        Ok(FileLock::new(file))
    }

    async fn read_experiment(&self, slug: &str) -> Result<Option<Experiment>, StoreError> {
        let path = self.experiment_path(slug)?;
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_experiment(&self, experiment: &Experiment) -> Result<(), StoreError> {
        let path = self.experiment_path(&experiment.slug)?;
        let serialized = serde_json::to_string_pretty(experiment)?;
        let temp_file = path.with_extension("json.tmp");
        fs::write(&temp_file, serialized).await?;
        fs::rename(&temp_file, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl ExperimentStore for FileExperimentStore {
    async fn insert(&self, experiment: &Experiment) -> Result<u64, StoreError> {
        self.ensure_root().await?;
        let _writer = self.writer.lock().await;
        let mut lock = self.open_lock()?;
        let _guard = lock.write().map_err(|e| StoreError::Lock {
            reason: e.to_string(),
        })?;

        if self.read_experiment(&experiment.slug).await?.is_some() {
            return Err(StoreError::AlreadyExists {
                slug: experiment.slug.clone(),
            });
        }
        let mut stored = experiment.clone();
        stored.version = 1;
        self.write_experiment(&stored).await?;

        info!(
            experiment = %experiment.slug,
            root = ?self.root,
            "Experiment stored"
        );
        Ok(1)
    }

    async fn load(&self, slug: &str) -> Result<Experiment, StoreError> {
        self.read_experiment(slug)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                slug: slug.to_string(),
            })
    }

    async fn save(&self, experiment: &Experiment, expected_version: u64) -> Result<u64, StoreError> {
        self.ensure_root().await?;
        let _writer = self.writer.lock().await;
        let mut lock = self.open_lock()?;
        let _guard = lock.write().map_err(|e| StoreError::Lock {
            reason: e.to_string(),
        })?;

        let current = self
            .read_experiment(&experiment.slug)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                slug: experiment.slug.clone(),
            })?;
        check_write(&current, experiment, expected_version)?;

        let mut stored = experiment.clone();
        stored.version = expected_version + 1;
        self.write_experiment(&stored).await?;

        debug!(experiment = %experiment.slug, version = stored.version, "Experiment saved");
        Ok(stored.version)
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ExperimentSummary>, StoreError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut experiments = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read_to_string(&path).await?;
            experiments.push(serde_json::from_str::<Experiment>(&contents)?);
        }
        Ok(summarize(experiments, filter))
    }
}
