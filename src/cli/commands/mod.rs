use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ExperimenterConfig, StorageBackend, StorageConfig};
use crate::experiment::{Permission, UserId};
use crate::service::ExperimentService;
use crate::store::{ExperimentStore, FileExperimentStore};
use crate::workflows::{Actor, WorkflowEngine};

pub mod create;
pub mod delivery;
pub mod edit;
pub mod lifecycle;
pub mod show;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self, ctx: &CommandContext) -> Result<()>;
}

/// Everything a command needs: the service, the loaded config and who is acting
pub struct CommandContext {
    pub service: ExperimentService,
    pub config: ExperimenterConfig,
    pub json: bool,
    user: Option<UserId>,
    permissions: BTreeSet<Permission>,
}

impl CommandContext {
    pub async fn open(
        config: ExperimenterConfig,
        store_dir: Option<PathBuf>,
        user: Option<String>,
        permissions: Vec<Permission>,
        json: bool,
    ) -> Result<Self> {
        let store = open_store(&config.storage, store_dir).await?;
        let service = ExperimentService::new(store, WorkflowEngine::new(config.engine_settings()));
        Ok(Self {
            service,
            config,
            json,
            user: user.map(UserId::new),
            permissions: permissions.into_iter().collect(),
        })
    }

    /// The acting user; commands that change an experiment need one
    pub fn actor(&self) -> Result<Actor> {
        let user = self
            .user
            .clone()
            .ok_or_else(|| anyhow!("No acting user: pass --user or set EXPERIMENTER_USER"))?;
        Ok(Actor {
            user,
            permissions: self.permissions.clone(),
        })
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

async fn open_store(
    storage: &StorageConfig,
    store_dir: Option<PathBuf>,
) -> Result<Arc<dyn ExperimentStore>> {
    if let Some(dir) = store_dir {
        return Ok(Arc::new(FileExperimentStore::new(dir)));
    }

    match storage.backend {
        StorageBackend::File => Ok(Arc::new(FileExperimentStore::new(storage.path.clone()))),
        #[cfg(feature = "database")]
        StorageBackend::Sqlite => {
            let store = crate::store::SqliteExperimentStore::connect(
                &storage.database_url,
                storage.auto_migrate,
            )
            .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "database"))]
        StorageBackend::Sqlite => Err(anyhow!(
            "The sqlite storage backend needs the 'database' feature"
        )),
    }
}

pub async fn show_getting_started() -> Result<()> {
    println!("🧪 Experimenter - experiment review workflow");
    println!();
    println!("To get started:");
    println!("  ✏️  experimenter create \"My Experiment\" --kind pref   # Draft an experiment");
    println!("  📋 experimenter sections my-experiment               # See what is missing");
    println!("  🚦 experimenter advance my-experiment --to review    # Send it for review");
    println!("  ✅ experimenter sign-off my-experiment --set science # Record sign-offs");
    println!("  📜 experimenter history my-experiment                # See every change");
    println!();
    println!("💡 Set EXPERIMENTER_USER to your email so changes are attributed to you");
    Ok(())
}
