// Core pipeline exports
pub mod advisory;
pub mod collector;
pub mod engine;
pub mod filters;
pub mod merger;
pub mod population;
pub mod sanitizer;
pub mod scoring;
pub mod stores;

pub use advisory::{Advisor, AdvisoryOutput, CandidateAdvice, DisabledAdvisor, PromptBuilder};
pub use collector::{CollectedData, DataCollector};
pub use engine::{validate_config, EngineSettings, GenerateOptions, RecommendationEngine};
pub use filters::{apply_eligibility, EligibilityOutcome};
pub use sanitizer::{sanitize, AdvisoryInput, SanitizedCandidate, SanitizedRequest};
pub use scoring::{calculate_scores, score_candidates};
pub use stores::{
    ConfigStore, PersistOutcome, ProfessionalStore, RecommendationStore, RejectedRecord,
    RequestStore, Roster, Stores,
};
