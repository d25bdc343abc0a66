//! In-memory collaborators, used by the test-suite and by the service when
//! started without external stores.

use crate::core::advisory::{Advisor, AdvisoryOutput};
use crate::core::sanitizer::AdvisoryInput;
use crate::core::stores::{
    ConfigStore, PersistOutcome, ProfessionalStore, RecommendationStore, RejectedRecord,
    RequestStore, Roster, StoreResult,
};
use crate::error::{AdvisoryError, StoreError};
use crate::models::{
    AvailabilityWindow, DemandeRecommendation, DemandeRecord, Professional, RecommendationConfig,
    RecommendationView,
};
use futures_util::future::BoxFuture;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    requests: BTreeMap<String, DemandeRecord>,
    professionals: BTreeMap<String, Professional>,
    availability: BTreeMap<String, u32>,
    availability_failures: BTreeMap<String, String>,
    rejected: Vec<RejectedRecord>,
    config: Option<RecommendationConfig>,
    recommendations: BTreeMap<String, DemandeRecommendation>,
    views: Vec<RecommendationView>,
}

/// Thread-safe in-memory store implementing every collaborator interface
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    availability_calls: AtomicUsize,
    request_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_request(&self, record: DemandeRecord) {
        self.state().requests.insert(record.id.clone(), record);
    }

    pub fn insert_professional(&self, professional: Professional, available_slots: u32) {
        let mut state = self.state();
        state
            .availability
            .insert(professional.id.clone(), available_slots);
        state
            .professionals
            .insert(professional.id.clone(), professional);
    }

    /// Report a roster entry that failed validation
    pub fn reject_professional(&self, professional_id: &str, detail: &str) {
        self.state().rejected.push(RejectedRecord {
            professional_id: professional_id.to_string(),
            detail: detail.to_string(),
        });
    }

    /// Make availability lookups for one professional fail
    pub fn fail_availability_for(&self, professional_id: &str, error: StoreError) {
        self.state()
            .availability_failures
            .insert(professional_id.to_string(), error.to_string());
    }

    pub fn set_config(&self, config: RecommendationConfig) {
        self.state().config = Some(config);
    }

    pub fn views(&self) -> Vec<RecommendationView> {
        self.state().views.clone()
    }

    pub fn stored_recommendation(&self, request_id: &str) -> Option<DemandeRecommendation> {
        self.state().recommendations.get(request_id).cloned()
    }

    pub fn availability_calls(&self) -> usize {
        self.availability_calls.load(Ordering::SeqCst)
    }

    pub fn request_calls(&self) -> usize {
        self.request_calls.load(Ordering::SeqCst)
    }
}

impl RequestStore for InMemoryStore {
    fn fetch_request<'a>(
        &'a self,
        request_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<DemandeRecord>>> {
        Box::pin(async move {
            self.request_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.state().requests.get(request_id).cloned())
        })
    }
}

impl ProfessionalStore for InMemoryStore {
    fn fetch_active_professionals(&self) -> BoxFuture<'_, StoreResult<Roster>> {
        Box::pin(async move {
            let state = self.state();
            Ok(Roster {
                professionals: state.professionals.values().cloned().collect(),
                rejected: state.rejected.clone(),
            })
        })
    }

    fn fetch_availability<'a>(
        &'a self,
        professional_id: &'a str,
        _window: AvailabilityWindow,
    ) -> BoxFuture<'a, StoreResult<u32>> {
        Box::pin(async move {
            self.availability_calls.fetch_add(1, Ordering::SeqCst);
            let state = self.state();
            if let Some(message) = state.availability_failures.get(professional_id) {
                return Err(StoreError::Unavailable(message.clone()));
            }
            state
                .availability
                .get(professional_id)
                .copied()
                .ok_or_else(|| {
                    StoreError::NotFound(format!("availability for {}", professional_id))
                })
        })
    }
}

impl ConfigStore for InMemoryStore {
    fn fetch_recommendation_config(
        &self,
    ) -> BoxFuture<'_, StoreResult<Option<RecommendationConfig>>> {
        Box::pin(async move { Ok(self.state().config.clone()) })
    }
}

impl RecommendationStore for InMemoryStore {
    fn upsert_recommendation<'a>(
        &'a self,
        recommendation: &'a DemandeRecommendation,
    ) -> BoxFuture<'a, StoreResult<PersistOutcome>> {
        Box::pin(async move {
            let mut state = self.state();
            let outcome = match state.recommendations.get(&recommendation.request_id) {
                Some(existing) if existing.metadata.run_id == recommendation.metadata.run_id => {
                    PersistOutcome::Duplicate
                }
                Some(existing)
                    if existing.metadata.generated_at > recommendation.metadata.generated_at =>
                {
                    PersistOutcome::Superseded
                }
                _ => PersistOutcome::Stored,
            };

            if outcome == PersistOutcome::Stored {
                state
                    .recommendations
                    .insert(recommendation.request_id.clone(), recommendation.clone());
            }
            Ok(outcome)
        })
    }

    fn fetch_latest_recommendation<'a>(
        &'a self,
        request_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<DemandeRecommendation>>> {
        Box::pin(async move { Ok(self.state().recommendations.get(request_id).cloned()) })
    }

    fn fetch_latest_run_id<'a>(
        &'a self,
        request_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<Uuid>>> {
        Box::pin(async move {
            Ok(self
                .state()
                .recommendations
                .get(request_id)
                .map(|r| r.metadata.run_id))
        })
    }

    fn append_view<'a>(&'a self, view: &'a RecommendationView) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.state().views.push(view.clone());
            Ok(())
        })
    }
}

enum Scripted {
    Respond(AdvisoryOutput),
    Fail(String),
    Delay(Duration, AdvisoryOutput),
}

/// Advisor replaying scripted responses in order
#[derive(Clone, Default)]
pub struct ScriptedAdvisor {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    inputs: Arc<Mutex<Vec<AdvisoryInput>>>,
}

impl ScriptedAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: Scripted) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(entry);
    }

    pub fn push_response(&self, output: AdvisoryOutput) {
        self.push(Scripted::Respond(output));
    }

    pub fn push_failure(&self, message: &str) {
        self.push(Scripted::Fail(message.to_string()));
    }

    /// Respond only after `delay`, to exercise the caller's timeout
    pub fn push_delayed(&self, delay: Duration, output: AdvisoryOutput) {
        self.push(Scripted::Delay(delay, output));
    }

    /// Inputs received so far
    pub fn received(&self) -> Vec<AdvisoryInput> {
        self.inputs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Advisor for ScriptedAdvisor {
    fn advise<'a>(
        &'a self,
        _model: &'a str,
        input: &'a AdvisoryInput,
    ) -> BoxFuture<'a, Result<AdvisoryOutput, AdvisoryError>> {
        Box::pin(async move {
            self.inputs
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(input.clone());

            let next = self
                .script
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();

            match next {
                Some(Scripted::Respond(output)) => Ok(output),
                Some(Scripted::Fail(message)) => Err(AdvisoryError::Unavailable(message)),
                Some(Scripted::Delay(delay, output)) => {
                    tokio::time::sleep(delay).await;
                    Ok(output)
                }
                None => Err(AdvisoryError::Unavailable("no scripted response left".to_string())),
            }
        })
    }
}
