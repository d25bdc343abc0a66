// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    AvailabilityWindow, Candidate, DemandType, DemandeRecommendation, DemandeRecord,
    DeterministicScores, ExclusionReason, ExclusionRecord, ExclusionSummary, GenerationMetadata,
    LicenseStatus, NearEligible, PopulationCategory, ProfessionAssignment, Professional,
    Proficiency, RankedProfessional, RecommendationConfig, RecommendationView, Request,
    ScoredCandidate, ScoringWeights, SoftCriterion, UrgencyLevel,
};
pub use requests::{GenerateRecommendationsRequest, LogViewRequest};
pub use responses::{ErrorResponse, HealthResponse, LogViewResponse};
