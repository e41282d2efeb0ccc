// SQLite store. The whole experiment is kept as a JSON body; a few columns
// are duplicated out of it for listing.

use async_trait::async_trait;
use sqlx::{migrate::MigrateDatabase, Row, SqlitePool};
use tracing::info;

use super::{check_write, summarize, ExperimentStore, ListFilter, StoreError};
use crate::experiment::{Experiment, ExperimentSummary};

#[derive(Debug, Clone)]
pub struct SqliteExperimentStore {
    pool: SqlitePool,
}

impl SqliteExperimentStore {
    /// Open (creating if needed) the database and optionally run migrations
    pub async fn connect(database_url: &str, auto_migrate: bool) -> Result<Self, StoreError> {
        if !sqlx::Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            sqlx::Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePool::connect(database_url).await?;

        if auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(sqlx::Error::from)?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }
}

#[async_trait]
impl ExperimentStore for SqliteExperimentStore {
    async fn insert(&self, experiment: &Experiment) -> Result<u64, StoreError> {
        let mut stored = experiment.clone();
        stored.version = 1;
        let body = serde_json::to_string(&stored)?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO experiments (slug, name, kind, status, owner, archived, version, body, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
            "#,
        )
        .bind(&stored.slug)
        .bind(&stored.name)
        .bind(stored.kind.as_str())
        .bind(stored.status.as_str())
        .bind(stored.owner.as_str())
        .bind(stored.archived)
        .bind(1_i64)
        .bind(body)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists {
                slug: experiment.slug.clone(),
            });
        }
        Ok(1)
    }

    async fn load(&self, slug: &str) -> Result<Experiment, StoreError> {
        let row = sqlx::query("SELECT body FROM experiments WHERE slug = ?1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: String = row.try_get("body")?;
                Ok(serde_json::from_str(&body)?)
            }
            None => Err(StoreError::NotFound {
                slug: slug.to_string(),
            }),
        }
    }

    async fn save(&self, experiment: &Experiment, expected_version: u64) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT body FROM experiments WHERE slug = ?1")
            .bind(&experiment.slug)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(StoreError::NotFound {
                slug: experiment.slug.clone(),
            });
        };
        let body: String = row.try_get("body")?;
        let current: Experiment = serde_json::from_str(&body)?;
        check_write(&current, experiment, expected_version)?;

        let mut stored = experiment.clone();
        stored.version = expected_version + 1;
        let body = serde_json::to_string(&stored)?;

        // The version guard also catches writers that slipped in after our read
        let result = sqlx::query(
            r#"
            UPDATE experiments
            SET name = ?1, status = ?2, owner = ?3, archived = ?4, version = ?5, body = ?6, updated_at = datetime('now')
            WHERE slug = ?7 AND version = ?8
            "#,
        )
        .bind(&stored.name)
        .bind(stored.status.as_str())
        .bind(stored.owner.as_str())
        .bind(stored.archived)
        .bind(stored.version as i64)
        .bind(body)
        .bind(&stored.slug)
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ConcurrentModification {
                slug: stored.slug.clone(),
                expected: expected_version,
                found: current.version,
            });
        }
        tx.commit().await?;
        Ok(stored.version)
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ExperimentSummary>, StoreError> {
        let rows = sqlx::query("SELECT body FROM experiments ORDER BY slug ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut experiments = Vec::with_capacity(rows.len());
        for row in rows {
            let body: String = row.try_get("body")?;
            experiments.push(serde_json::from_str::<Experiment>(&body)?);
        }
        Ok(summarize(experiments, filter))
    }
}
