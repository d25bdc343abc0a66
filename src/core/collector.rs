use crate::core::population::derive_population_categories;
use crate::core::stores::{ProfessionalStore, RequestStore, Roster};
use crate::error::{RecommendationError, RecommendationResult};
use crate::models::{
    AvailabilityWindow, Candidate, DemandeRecord, ExclusionReason, ExclusionRecord, Request,
};
use chrono::NaiveDate;
use futures_util::stream::{self, StreamExt};

/// Everything the later stages need for one run
#[derive(Debug, Clone)]
pub struct CollectedData {
    pub request: Request,
    /// Candidates whose availability was fetched, in roster id order
    pub candidates: Vec<Candidate>,
    /// Candidates dropped because their data could not be fetched or mapped
    pub unavailable: Vec<ExclusionRecord>,
    pub pool_size: usize,
}

/// Stage 1: gathers the request and the candidate pool
pub struct DataCollector<'a> {
    requests: &'a dyn RequestStore,
    professionals: &'a dyn ProfessionalStore,
    max_concurrent_fetches: usize,
}

impl<'a> DataCollector<'a> {
    pub fn new(
        requests: &'a dyn RequestStore,
        professionals: &'a dyn ProfessionalStore,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            requests,
            professionals,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    /// Fetch the request and the active pool with per-candidate availability.
    ///
    /// Fails with `RequestNotFound` when the request id is unknown. An
    /// invalid roster entry or a failed availability fetch excludes only that
    /// candidate.
    pub async fn collect(
        &self,
        request_id: &str,
        window: AvailabilityWindow,
        as_of: NaiveDate,
    ) -> RecommendationResult<CollectedData> {
        let record = self
            .requests
            .fetch_request(request_id)
            .await?
            .ok_or_else(|| RecommendationError::RequestNotFound(request_id.to_string()))?;

        let request = build_request(record, as_of);

        let Roster {
            professionals: mut roster,
            rejected,
        } = self.professionals.fetch_active_professionals().await?;
        roster.sort_by(|a, b| a.id.cmp(&b.id));
        roster.dedup_by(|a, b| a.id == b.id);

        // A rejected entry whose id also mapped cleanly is a duplicate, not a candidate
        let mut unavailable: Vec<ExclusionRecord> = Vec::new();
        for record in rejected {
            let id = record.professional_id;
            let seen = roster.binary_search_by(|p| p.id.cmp(&id)).is_ok()
                || unavailable.iter().any(|e| e.candidate_id == id);
            if !seen {
                unavailable.push(ExclusionRecord {
                    candidate_id: id,
                    reason: ExclusionReason::DataUnavailable,
                    detail: format!("professional record invalid: {}", record.detail),
                });
            }
        }
        let pool_size = roster.len() + unavailable.len();

        tracing::debug!(
            "Fetching availability for {} professionals (concurrency: {})",
            pool_size,
            self.max_concurrent_fetches
        );

        let professionals = self.professionals;
        // `buffered` keeps roster order regardless of completion order
        let fetched: Vec<_> = stream::iter(roster)
            .map(|professional| async move {
                let slots = professionals
                    .fetch_availability(&professional.id, window)
                    .await;
                (professional, slots)
            })
            .buffered(self.max_concurrent_fetches)
            .collect()
            .await;

        let mut candidates = Vec::with_capacity(fetched.len());

        for (professional, slots) in fetched {
            match slots {
                Ok(available_slots) => candidates.push(Candidate {
                    professional,
                    available_slots,
                }),
                Err(e) => {
                    tracing::warn!(
                        "Availability unavailable for professional {}, excluding: {}",
                        professional.id,
                        e
                    );
                    unavailable.push(ExclusionRecord {
                        candidate_id: professional.id,
                        reason: ExclusionReason::DataUnavailable,
                        detail: format!("availability fetch failed: {}", e),
                    });
                }
            }
        }

        Ok(CollectedData {
            request,
            candidates,
            unavailable,
            pool_size,
        })
    }
}

/// Turn a stored request into the pipeline's view of it
pub fn build_request(record: DemandeRecord, as_of: NaiveDate) -> Request {
    let population_categories = derive_population_categories(&record.participant_birthdates, as_of);

    Request {
        id: record.id,
        demand_type: record.demand_type,
        urgency: record.urgency,
        motif_keys: record.motif_keys,
        required_specialties: record.required_specialties,
        preferred_specialties: record.preferred_specialties,
        description: record.description,
        clinical_notes: record.clinical_notes,
        legal_context: record.legal_context,
        population_categories,
    }
}
