//! Interfaces to the external collaborators the pipeline reads from and
//! writes to. Implementations live in `crate::services`.

use crate::error::StoreError;
use crate::models::{
    AvailabilityWindow, DemandeRecommendation, DemandeRecord, Professional, RecommendationConfig,
    RecommendationView,
};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

/// Request (demande) store
pub trait RequestStore: Send + Sync {
    /// `Ok(None)` when no request exists for the id
    fn fetch_request<'a>(
        &'a self,
        request_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<DemandeRecord>>>;
}

/// A roster entry the store returned but could not map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub professional_id: String,
    pub detail: String,
}

/// Active professionals, plus the entries that failed validation
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub professionals: Vec<Professional>,
    pub rejected: Vec<RejectedRecord>,
}

/// Professional roster and availability store
pub trait ProfessionalStore: Send + Sync {
    /// An unmappable entry is reported in `Roster::rejected` and does not
    /// fail the whole roster
    fn fetch_active_professionals(&self) -> BoxFuture<'_, StoreResult<Roster>>;

    /// Number of open slots for one professional within the window
    fn fetch_availability<'a>(
        &'a self,
        professional_id: &'a str,
        window: AvailabilityWindow,
    ) -> BoxFuture<'a, StoreResult<u32>>;
}

/// Recommendation configuration store
pub trait ConfigStore: Send + Sync {
    /// `Ok(None)` when no configuration is active; callers fall back to
    /// `RecommendationConfig::default()`
    fn fetch_recommendation_config(
        &self,
    ) -> BoxFuture<'_, StoreResult<Option<RecommendationConfig>>>;
}

/// Outcome of persisting a generated recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Written as the latest recommendation for the request
    Stored,
    /// Same run id already stored; nothing written
    Duplicate,
    /// A newer run is already stored; nothing written
    Superseded,
}

/// Persistence of generated results and view logs
pub trait RecommendationStore: Send + Sync {
    /// Upsert keyed by request id. Must never replace a newer
    /// `generated_at` and must be idempotent per run id.
    fn upsert_recommendation<'a>(
        &'a self,
        recommendation: &'a DemandeRecommendation,
    ) -> BoxFuture<'a, StoreResult<PersistOutcome>>;

    fn fetch_latest_recommendation<'a>(
        &'a self,
        request_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<DemandeRecommendation>>>;

    /// Run id of the stored recommendation, without loading its payload
    fn fetch_latest_run_id<'a>(
        &'a self,
        request_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<Uuid>>>;

    /// Append-only
    fn append_view<'a>(&'a self, view: &'a RecommendationView) -> BoxFuture<'a, StoreResult<()>>;
}

/// The full set of collaborators an engine is built from
#[derive(Clone)]
pub struct Stores {
    pub requests: Arc<dyn RequestStore>,
    pub professionals: Arc<dyn ProfessionalStore>,
    pub configs: Arc<dyn ConfigStore>,
    pub recommendations: Arc<dyn RecommendationStore>,
}

impl Stores {
    /// Use one backend for every collaborator
    pub fn shared<T>(store: Arc<T>) -> Self
    where
        T: RequestStore + ProfessionalStore + ConfigStore + RecommendationStore + 'static,
    {
        Self {
            requests: store.clone(),
            professionals: store.clone(),
            configs: store.clone(),
            recommendations: store,
        }
    }
}
