use crate::core::{
    advisory::{request_advice, Advisor, DisabledAdvisor},
    collector::DataCollector,
    filters::{apply_eligibility, sort_exclusions},
    merger::{assemble, merge_scores},
    sanitizer::sanitize,
    scoring::score_candidates,
    stores::{PersistOutcome, Stores},
};
use crate::error::{RecommendationError, RecommendationResult};
use crate::models::{
    AvailabilityWindow, DemandeRecommendation, GenerationMetadata, RecommendationConfig,
    RecommendationView,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Tolerance on the sum of the scoring weights
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Longest availability lookahead a config may ask for
pub const MAX_LOOKAHEAD_DAYS: i64 = 366;

/// Reject configurations the pipeline cannot run with
pub fn validate_config(config: &RecommendationConfig) -> RecommendationResult<()> {
    let weights = &config.weights;
    let all = [
        ("motif", weights.motif),
        ("availability", weights.availability),
        ("experience", weights.experience),
        ("specialty", weights.specialty),
    ];

    if let Some((name, value)) = all.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
        return Err(RecommendationError::InvalidConfig(format!(
            "weight '{}' must be a non-negative number, got {}",
            name, value
        )));
    }

    let sum = weights.sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(RecommendationError::InvalidConfig(format!(
            "weights must sum to 1, got {}",
            sum
        )));
    }

    if config.lookahead_days <= 0 || config.lookahead_days > MAX_LOOKAHEAD_DAYS {
        return Err(RecommendationError::InvalidConfig(format!(
            "lookahead window must be within 1..={} days, got {}",
            MAX_LOOKAHEAD_DAYS, config.lookahead_days
        )));
    }
    if config.window_target_slots == 0 {
        return Err(RecommendationError::InvalidConfig(
            "window target slots must be positive".to_string(),
        ));
    }
    if config.experience_cap_years == 0 {
        return Err(RecommendationError::InvalidConfig(
            "experience cap must be positive".to_string(),
        ));
    }
    if config.max_results == 0 {
        return Err(RecommendationError::InvalidConfig(
            "max results must be positive".to_string(),
        ));
    }
    if !(0.0..=0.5).contains(&config.advisory_max_adjustment) {
        return Err(RecommendationError::InvalidConfig(format!(
            "advisory max adjustment must be within [0, 0.5], got {}",
            config.advisory_max_adjustment
        )));
    }
    if !(0.0..=1.0).contains(&config.min_motif_coverage) {
        return Err(RecommendationError::InvalidConfig(format!(
            "min motif coverage must be within [0, 1], got {}",
            config.min_motif_coverage
        )));
    }

    Ok(())
}

/// Process-level engine settings (not per clinic)
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub max_concurrent_fetches: usize,
    pub advisory_timeout: Duration,
    pub advisory_max_candidates: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            advisory_timeout: Duration::from_secs(20),
            advisory_max_candidates: 20,
        }
    }
}

/// Per-call options for `generate_recommendations`
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Lower the configured result count for this call
    pub max_results: Option<usize>,
    /// Skip the advisory layer even when the config enables it
    pub disable_advisory: bool,
    /// Reference date for age bands; defaults to today
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RunToken {
    run_id: Uuid,
    started_at: DateTime<Utc>,
}

/// Latest run per request id, so a superseded run never persists
#[derive(Debug, Default)]
struct RunRegistry {
    latest: Mutex<HashMap<String, RunToken>>,
}

impl RunRegistry {
    fn begin(&self, request_id: &str) -> RunToken {
        let token = RunToken {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        };
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = latest.insert(request_id.to_string(), token) {
            tracing::debug!(
                "Run {} for request {} supersedes in-flight run {}",
                token.run_id,
                request_id,
                previous.run_id
            );
        }
        token
    }

    fn is_current(&self, request_id: &str, token: &RunToken) -> bool {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        latest.get(request_id) == Some(token)
    }

    fn finish(&self, request_id: &str, token: &RunToken) {
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        if latest.get(request_id) == Some(token) {
            latest.remove(request_id);
        }
    }
}

/// Recommendation pipeline orchestrator
///
/// # Pipeline Stages
/// 1. Data collection (request, roster, availability)
/// 2. Eligibility filtering
/// 3. Deterministic scoring
/// 4. Sanitization
/// 5. Advisory adjustment (optional, never fatal)
/// 6. Merge, assembly and persistence
pub struct RecommendationEngine {
    stores: Stores,
    advisor: Arc<dyn Advisor>,
    settings: EngineSettings,
    runs: RunRegistry,
}

impl RecommendationEngine {
    pub fn new(stores: Stores, advisor: Arc<dyn Advisor>, settings: EngineSettings) -> Self {
        Self {
            stores,
            advisor,
            settings,
            runs: RunRegistry::default(),
        }
    }

    /// Engine without an advisory service
    pub fn deterministic(stores: Stores, settings: EngineSettings) -> Self {
        Self::new(stores, Arc::new(DisabledAdvisor), settings)
    }

    /// Active configuration from the config store, or the default one
    pub async fn load_config(&self) -> RecommendationResult<RecommendationConfig> {
        let config = self
            .stores
            .configs
            .fetch_recommendation_config()
            .await?
            .unwrap_or_else(|| {
                tracing::debug!("No active recommendation config, using defaults");
                RecommendationConfig::default()
            });
        Ok(config)
    }

    /// Run the full pipeline for a request.
    ///
    /// Writes at most one recommendation (upsert) and makes zero or one
    /// advisory call. Fails only on an unknown request, an invalid config,
    /// a sanitization defect, or an unreachable request/roster store.
    pub async fn generate_recommendations(
        &self,
        request_id: &str,
        options: GenerateOptions,
    ) -> RecommendationResult<DemandeRecommendation> {
        let mut config = self.load_config().await?;
        if let Some(max_results) = options.max_results {
            config.max_results = config.max_results.min(max_results);
        }
        validate_config(&config)?;

        let token = self.runs.begin(request_id);
        let result = self.run_pipeline(request_id, &options, config, &token).await;
        self.runs.finish(request_id, &token);
        result
    }

    async fn run_pipeline(
        &self,
        request_id: &str,
        options: &GenerateOptions,
        config: RecommendationConfig,
        token: &RunToken,
    ) -> RecommendationResult<DemandeRecommendation> {
        let as_of = options.as_of.unwrap_or_else(|| token.started_at.date_naive());
        let window = AvailabilityWindow::starting_at(token.started_at, config.lookahead_days)
            .ok_or_else(|| {
                RecommendationError::InvalidConfig(format!(
                    "lookahead window of {} days is out of range",
                    config.lookahead_days
                ))
            })?;

        tracing::info!(
            "Generating recommendations for request {} (run {}, config {})",
            request_id,
            token.run_id,
            config.version
        );

        // Stage 1
        let collector = DataCollector::new(
            self.stores.requests.as_ref(),
            self.stores.professionals.as_ref(),
            self.settings.max_concurrent_fetches,
        );
        let collected = collector.collect(request_id, window, as_of).await?;
        let request = collected.request;

        // Stage 2
        let eligibility = apply_eligibility(collected.candidates, &request, &config);
        let mut exclusions = collected.unavailable;
        exclusions.extend(eligibility.excluded);
        sort_exclusions(&mut exclusions);

        // Stage 3
        let scored = score_candidates(eligibility.eligible, &request, &config);

        tracing::debug!(
            "Request {}: {} eligible, {} excluded, {} near-eligible",
            request_id,
            scored.len(),
            exclusions.len(),
            eligibility.near_eligible.len()
        );

        // Stages 4 and 5
        let advisory_wanted =
            config.advisory_enabled && !options.disable_advisory && !scored.is_empty();
        let mut advice = BTreeMap::new();
        let mut ai_assisted = false;

        if advisory_wanted {
            let input = sanitize(&request, &scored, self.settings.advisory_max_candidates)?;

            match request_advice(
                self.advisor.as_ref(),
                &config.advisory_model,
                &input,
                self.settings.advisory_timeout,
            )
            .await
            {
                Ok(valid) => {
                    tracing::debug!(
                        "Advisory returned {} usable adjustments for request {}",
                        valid.len(),
                        request_id
                    );
                    advice = valid;
                    ai_assisted = true;
                }
                Err(e) => {
                    tracing::warn!(
                        "Advisory unavailable for request {}, using deterministic scores: {}",
                        request_id,
                        e
                    );
                }
            }
        }

        // Stage 6
        let ranked = merge_scores(
            &scored,
            &advice,
            config.advisory_max_adjustment,
            config.max_results,
        );

        let advisory_model = if ai_assisted {
            config.advisory_model.clone()
        } else {
            "none".to_string()
        };

        let metadata = GenerationMetadata {
            run_id: token.run_id,
            generated_at: token.started_at,
            as_of,
            config,
            advisory_model,
            ai_assisted,
            candidate_pool_size: collected.pool_size,
        };

        let recommendation = assemble(
            request_id,
            ranked,
            exclusions,
            eligibility.near_eligible,
            metadata,
        );

        self.persist(&recommendation, token).await;

        tracing::info!(
            "Returning {} recommendations for request {} (pool: {}, ai_assisted: {})",
            recommendation.ranked.len(),
            request_id,
            recommendation.metadata.candidate_pool_size,
            recommendation.metadata.ai_assisted
        );

        Ok(recommendation)
    }

    async fn persist(&self, recommendation: &DemandeRecommendation, token: &RunToken) {
        let request_id = recommendation.request_id.as_str();

        if !self.runs.is_current(request_id, token) {
            tracing::info!(
                "Discarding result of superseded run {} for request {}",
                token.run_id,
                request_id
            );
            return;
        }

        match self.stores.recommendations.upsert_recommendation(recommendation).await {
            Ok(PersistOutcome::Stored) => {
                tracing::debug!(
                    "Stored recommendation run {} for request {}",
                    token.run_id,
                    request_id
                );
            }
            Ok(PersistOutcome::Duplicate) => {
                tracing::debug!("Run {} already stored for request {}", token.run_id, request_id);
            }
            Ok(PersistOutcome::Superseded) => {
                tracing::info!(
                    "Store holds a newer recommendation for request {}, run {} not written",
                    request_id,
                    token.run_id
                );
            }
            Err(e) => {
                tracing::error!(
                    "Failed to persist recommendation for request {}: {}",
                    request_id,
                    e
                );
            }
        }
    }

    /// Latest persisted recommendation for a request, if any
    pub async fn fetch_recommendations(
        &self,
        request_id: &str,
    ) -> RecommendationResult<Option<DemandeRecommendation>> {
        Ok(self
            .stores
            .recommendations
            .fetch_latest_recommendation(request_id)
            .await?)
    }

    /// Run id of the latest persisted recommendation, if any
    pub async fn latest_run_id(&self, request_id: &str) -> RecommendationResult<Option<Uuid>> {
        Ok(self
            .stores
            .recommendations
            .fetch_latest_run_id(request_id)
            .await?)
    }

    /// Append one view-log row
    pub async fn log_recommendation_view(
        &self,
        request_id: &str,
        viewer_id: &str,
        viewed_at: DateTime<Utc>,
    ) -> RecommendationResult<RecommendationView> {
        let view = RecommendationView {
            event_id: Uuid::new_v4(),
            request_id: request_id.to_string(),
            viewer_id: viewer_id.to_string(),
            viewed_at,
        };

        self.stores.recommendations.append_view(&view).await?;

        tracing::debug!("Logged view of request {} recommendations", request_id);

        Ok(view)
    }
}
