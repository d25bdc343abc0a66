use crate::core::stores::{ConfigStore, PersistOutcome, RecommendationStore, StoreResult};
use crate::error::StoreError;
use crate::models::{DemandeRecommendation, RecommendationConfig, RecommendationView};
use futures_util::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while setting up the PostgreSQL connection
#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
}

/// PostgreSQL store for recommendation artifacts, view logs and engine
/// configuration
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, PostgresError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, PostgresError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Newest active configuration, if any
    pub async fn active_config(&self) -> Result<Option<RecommendationConfig>, StoreError> {
        let query = r#"
            SELECT version, config
            FROM recommendation_configs
            WHERE is_active
            ORDER BY created_at DESC
            LIMIT 1
        "#;

        let row = match sqlx::query(query).fetch_optional(&self.pool).await? {
            Some(row) => row,
            None => return Ok(None),
        };

        let version: String = row.try_get("version")?;
        let raw: serde_json::Value = row.try_get("config")?;

        map_config_row(version, raw).map(Some)
    }

    /// Write the recommendation unless a newer one is already stored.
    ///
    /// The conflict clause only replaces rows with an older or equal
    /// `generated_at` and a different run id. When nothing is written the
    /// stored run id tells a replay apart from a newer run.
    pub async fn save_recommendation(
        &self,
        recommendation: &DemandeRecommendation,
    ) -> Result<PersistOutcome, StoreError> {
        let payload = serde_json::to_value(recommendation)?;
        let metadata = &recommendation.metadata;

        let query = r#"
            INSERT INTO demande_recommendations
                (request_id, run_id, generated_at, config_version, advisory_model, ai_assisted, payload, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (request_id)
            DO UPDATE SET
                run_id = EXCLUDED.run_id,
                generated_at = EXCLUDED.generated_at,
                config_version = EXCLUDED.config_version,
                advisory_model = EXCLUDED.advisory_model,
                ai_assisted = EXCLUDED.ai_assisted,
                payload = EXCLUDED.payload,
                updated_at = NOW()
            WHERE demande_recommendations.generated_at <= EXCLUDED.generated_at
              AND demande_recommendations.run_id <> EXCLUDED.run_id
            RETURNING run_id
        "#;

        let written = sqlx::query(query)
            .bind(&recommendation.request_id)
            .bind(metadata.run_id)
            .bind(metadata.generated_at)
            .bind(&metadata.config.version)
            .bind(&metadata.advisory_model)
            .bind(metadata.ai_assisted)
            .bind(payload)
            .fetch_optional(&self.pool)
            .await?;

        if written.is_some() {
            return Ok(PersistOutcome::Stored);
        }

        let stored_run: Uuid = sqlx::query(
            "SELECT run_id FROM demande_recommendations WHERE request_id = $1",
        )
        .bind(&recommendation.request_id)
        .fetch_one(&self.pool)
        .await?
        .try_get("run_id")?;

        Ok(unwritten_outcome(stored_run, metadata.run_id))
    }

    pub async fn latest_recommendation(
        &self,
        request_id: &str,
    ) -> Result<Option<DemandeRecommendation>, StoreError> {
        let row = sqlx::query("SELECT payload FROM demande_recommendations WHERE request_id = $1")
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let payload: serde_json::Value = row.try_get("payload")?;
                let recommendation = serde_json::from_value(payload)
                    .map_err(|e| StoreError::schema("demande_recommendation", e.to_string()))?;
                Ok(Some(recommendation))
            }
            None => Ok(None),
        }
    }

    /// Run id of the stored recommendation, used to validate cached copies
    pub async fn latest_run_id(&self, request_id: &str) -> Result<Option<Uuid>, StoreError> {
        let row = sqlx::query("SELECT run_id FROM demande_recommendations WHERE request_id = $1")
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("run_id")?)),
            None => Ok(None),
        }
    }

    pub async fn record_view(&self, view: &RecommendationView) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO recommendation_view_logs (event_id, request_id, viewer_id, viewed_at)
            VALUES ($1, $2, $3, $4)
        "#;

        sqlx::query(query)
            .bind(view.event_id)
            .bind(&view.request_id)
            .bind(&view.viewer_id)
            .bind(view.viewed_at)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Recorded view {} for request {}", view.event_id, view.request_id);

        Ok(())
    }

    pub async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

/// Build a config from its row. Unknown or missing required keys are a
/// schema error; the row's version wins over any version in the JSON.
fn map_config_row(
    version: String,
    raw: serde_json::Value,
) -> Result<RecommendationConfig, StoreError> {
    let mut config: RecommendationConfig = serde_json::from_value(raw)
        .map_err(|e| StoreError::schema("recommendation_config", e.to_string()))?;
    config.version = version;
    Ok(config)
}

/// Classify an upsert that wrote nothing
fn unwritten_outcome(stored_run: Uuid, attempted_run: Uuid) -> PersistOutcome {
    if stored_run == attempted_run {
        PersistOutcome::Duplicate
    } else {
        PersistOutcome::Superseded
    }
}

impl ConfigStore for PostgresClient {
    fn fetch_recommendation_config(
        &self,
    ) -> BoxFuture<'_, StoreResult<Option<RecommendationConfig>>> {
        Box::pin(self.active_config())
    }
}

impl RecommendationStore for PostgresClient {
    fn upsert_recommendation<'a>(
        &'a self,
        recommendation: &'a DemandeRecommendation,
    ) -> BoxFuture<'a, StoreResult<PersistOutcome>> {
        Box::pin(self.save_recommendation(recommendation))
    }

    fn fetch_latest_recommendation<'a>(
        &'a self,
        request_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<DemandeRecommendation>>> {
        Box::pin(self.latest_recommendation(request_id))
    }

    fn fetch_latest_run_id<'a>(
        &'a self,
        request_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<Uuid>>> {
        Box::pin(self.latest_run_id(request_id))
    }

    fn append_view<'a>(&'a self, view: &'a RecommendationView) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(self.record_view(view))
    }
}
