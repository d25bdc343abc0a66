use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Kind of service requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemandType {
    Individual,
    Couple,
    Family,
    Group,
}

impl DemandType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "individual" | "individuel" => Some(Self::Individual),
            "couple" => Some(Self::Couple),
            "family" | "famille" => Some(Self::Family),
            "group" | "groupe" => Some(Self::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl UrgencyLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" | "faible" => Some(Self::Low),
            "moderate" | "medium" | "moyenne" => Some(Self::Moderate),
            "high" | "elevee" | "élevée" => Some(Self::High),
            "critical" | "critique" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Age band a participant falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopulationCategory {
    Child,
    Adolescent,
    Adult,
    Senior,
}

impl PopulationCategory {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "child" | "enfant" => Some(Self::Child),
            "adolescent" | "teen" => Some(Self::Adolescent),
            "adult" | "adulte" => Some(Self::Adult),
            "senior" | "aine" | "aîné" => Some(Self::Senior),
            _ => None,
        }
    }
}

/// Request as stored by the request collaborator, before derivation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandeRecord {
    pub id: String,
    pub demand_type: DemandType,
    pub urgency: UrgencyLevel,
    pub motif_keys: BTreeSet<String>,
    pub required_specialties: BTreeSet<String>,
    pub preferred_specialties: BTreeSet<String>,
    pub description: Option<String>,
    pub clinical_notes: Option<String>,
    pub legal_context: bool,
    pub participant_birthdates: Vec<NaiveDate>,
}

/// Request (demande) as seen by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: String,
    pub demand_type: DemandType,
    pub urgency: UrgencyLevel,
    pub motif_keys: BTreeSet<String>,
    pub required_specialties: BTreeSet<String>,
    pub preferred_specialties: BTreeSet<String>,
    pub description: Option<String>,
    pub clinical_notes: Option<String>,
    pub legal_context: bool,
    pub population_categories: BTreeSet<PopulationCategory>,
}

impl Request {
    /// Specialties considered by the specialty score
    pub fn requested_specialties(&self) -> BTreeSet<&str> {
        self.required_specialties
            .iter()
            .chain(self.preferred_specialties.iter())
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proficiency {
    Basic,
    Intermediate,
    Expert,
}

impl Proficiency {
    pub fn weight(self) -> f64 {
        match self {
            Proficiency::Basic => 1.0 / 3.0,
            Proficiency::Intermediate => 2.0 / 3.0,
            Proficiency::Expert => 1.0,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "basic" | "base" | "1" => Some(Self::Basic),
            "intermediate" | "intermediaire" | "2" => Some(Self::Intermediate),
            "expert" | "3" => Some(Self::Expert),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Suspended,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionAssignment {
    pub profession: String,
    pub is_primary: bool,
}

/// Professional as provided by the roster collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Professional {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub professions: Vec<ProfessionAssignment>,
    /// Specialty code -> proficiency
    pub specialties: BTreeMap<String, Proficiency>,
    pub years_experience: u32,
    pub motifs: BTreeSet<String>,
    pub clienteles: BTreeSet<PopulationCategory>,
    pub demand_types: BTreeSet<DemandType>,
    pub co_treatment: bool,
    pub accepts_legal_mandates: bool,
    pub license_status: LicenseStatus,
}

impl Professional {
    /// Primary profession, falling back to the alphabetically first one
    pub fn primary_profession(&self) -> Option<&str> {
        self.professions
            .iter()
            .find(|p| p.is_primary)
            .or_else(|| self.professions.iter().min_by(|a, b| a.profession.cmp(&b.profession)))
            .map(|p| p.profession.as_str())
    }
}

/// A professional considered for one run, with its availability snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub professional: Professional,
    pub available_slots: u32,
}

impl Candidate {
    pub fn id(&self) -> &str {
        &self.professional.id
    }
}

/// Availability lookahead window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AvailabilityWindow {
    /// `None` when the end of the window is not representable
    pub fn starting_at(start: DateTime<Utc>, lookahead_days: i64) -> Option<Self> {
        let end = start.checked_add_signed(chrono::TimeDelta::try_days(lookahead_days)?)?;
        Some(Self { start, end })
    }
}

/// Scoring weights, one per scoring dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringWeights {
    pub motif: f64,
    pub availability: f64,
    pub experience: f64,
    pub specialty: f64,
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.motif + self.availability + self.experience + self.specialty
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            motif: 0.35,
            availability: 0.25,
            experience: 0.15,
            specialty: 0.25,
        }
    }
}

/// Per-run recommendation settings, versioned by the config store.
///
/// Weights, window and limits are required. Only the advisory switch and the
/// soft thresholds fall back to defaults when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecommendationConfig {
    #[serde(default = "default_config_version")]
    pub version: String,
    pub weights: ScoringWeights,
    pub lookahead_days: i64,
    pub window_target_slots: u32,
    pub experience_cap_years: u32,
    pub max_results: usize,
    #[serde(default)]
    pub advisory_enabled: bool,
    #[serde(default = "default_advisory_model")]
    pub advisory_model: String,
    pub advisory_max_adjustment: f64,
    #[serde(default = "default_comfortable_slots")]
    pub comfortable_slots: u32,
    #[serde(default)]
    pub min_years_experience: u32,
    #[serde(default)]
    pub min_motif_coverage: f64,
    #[serde(default)]
    pub co_treatment_demand_types: BTreeSet<DemandType>,
}

fn default_config_version() -> String {
    "default".to_string()
}

fn default_advisory_model() -> String {
    "none".to_string()
}

fn default_comfortable_slots() -> u32 {
    3
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            version: default_config_version(),
            weights: ScoringWeights::default(),
            lookahead_days: 14,
            window_target_slots: 10,
            experience_cap_years: 15,
            max_results: 10,
            advisory_enabled: false,
            advisory_model: default_advisory_model(),
            advisory_max_adjustment: 0.1,
            comfortable_slots: default_comfortable_slots(),
            min_years_experience: 0,
            min_motif_coverage: 0.0,
            co_treatment_demand_types: BTreeSet::new(),
        }
    }
}

/// Closed set of hard exclusion reasons, declared in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    DataUnavailable,
    LicenseInactive,
    DemandTypeIncompatible,
    ClienteleIneligible,
    SpecialtyMismatch,
    LegalContextUnsupported,
    NoAvailability,
}

impl ExclusionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExclusionReason::DataUnavailable => "data_unavailable",
            ExclusionReason::LicenseInactive => "license_inactive",
            ExclusionReason::DemandTypeIncompatible => "demand_type_incompatible",
            ExclusionReason::ClienteleIneligible => "clientele_ineligible",
            ExclusionReason::SpecialtyMismatch => "specialty_mismatch",
            ExclusionReason::LegalContextUnsupported => "legal_context_unsupported",
            ExclusionReason::NoAvailability => "no_availability",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionRecord {
    pub candidate_id: String,
    pub reason: ExclusionReason,
    pub detail: String,
}

/// Soft criteria, declared in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftCriterion {
    ComfortableAvailability,
    MinimumExperience,
    MotifCoverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearEligible {
    pub candidate_id: String,
    pub criterion: SoftCriterion,
    /// Numeric size of the gap in the criterion's unit
    pub gap: f64,
    pub gap_description: String,
}

/// Component scores for one surviving candidate, all in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeterministicScores {
    pub motif: f64,
    pub availability: f64,
    pub experience: f64,
    pub specialty: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub scores: DeterministicScores,
    pub matched_motifs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedProfessional {
    pub professional_id: String,
    pub rank: usize,
    pub final_score: f64,
    pub scores: DeterministicScores,
    pub advisory_applied: bool,
    pub advisory_adjustment: Option<f64>,
    pub reasoning: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionSummary {
    pub total: usize,
    /// Reason code -> count
    pub by_reason: BTreeMap<String, usize>,
    pub records: Vec<ExclusionRecord>,
}

impl ExclusionSummary {
    pub fn from_records(records: Vec<ExclusionRecord>) -> Self {
        let mut by_reason = BTreeMap::new();
        for record in &records {
            *by_reason.entry(record.reason.as_str().to_string()).or_insert(0) += 1;
        }
        Self {
            total: records.len(),
            by_reason,
            records,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub config: RecommendationConfig,
    /// Advisory model identifier, or "none" when the run was deterministic only
    pub advisory_model: String,
    pub ai_assisted: bool,
    pub candidate_pool_size: usize,
}

/// Final, immutable result of one recommendation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandeRecommendation {
    pub request_id: String,
    pub ranked: Vec<RankedProfessional>,
    pub exclusions: ExclusionSummary,
    pub near_eligible: Vec<NearEligible>,
    pub metadata: GenerationMetadata,
}

impl DemandeRecommendation {
    pub fn ai_assisted(&self) -> bool {
        self.metadata.ai_assisted
    }
}

/// Append-only record of a viewer opening a recommendation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationView {
    pub event_id: Uuid,
    pub request_id: String,
    pub viewer_id: String,
    pub viewed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let weights = ScoringWeights::default();
        assert!((weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_overflow_is_none() {
        let start = Utc::now();

        assert!(AvailabilityWindow::starting_at(start, 14).is_some());
        assert!(AvailabilityWindow::starting_at(start, 1_000_000_000).is_none());
        assert!(AvailabilityWindow::starting_at(start, i64::MAX).is_none());
    }

    #[test]
    fn test_config_rejects_misspelled_keys() {
        let misspelled = serde_json::json!({
            "weigths": {"motif": 1.0, "availability": 0.0, "experience": 0.0, "specialty": 0.0},
            "lookaheadDays": 14,
            "windowTargetSlots": 10,
            "experienceCapYears": 15,
            "maxResult": 3,
            "advisoryMaxAdjustment": 0.1
        });

        assert!(serde_json::from_value::<RecommendationConfig>(misspelled).is_err());
    }

    #[test]
    fn test_config_optional_fields_default() {
        let minimal = serde_json::json!({
            "weights": {"motif": 0.4, "availability": 0.3, "experience": 0.3, "specialty": 0.0},
            "lookaheadDays": 7,
            "windowTargetSlots": 5,
            "experienceCapYears": 10,
            "maxResults": 3,
            "advisoryMaxAdjustment": 0.05
        });

        let config: RecommendationConfig = serde_json::from_value(minimal).unwrap();

        assert_eq!(config.max_results, 3);
        assert_eq!(config.weights.motif, 0.4);
        assert!(!config.advisory_enabled);
        assert_eq!(config.advisory_model, "none");
        assert_eq!(config.comfortable_slots, 3);
        assert!(config.co_treatment_demand_types.is_empty());
    }

    #[test]
    fn test_config_round_trips_through_payload() {
        let config = RecommendationConfig::default();
        let value = serde_json::to_value(&config).unwrap();

        assert_eq!(serde_json::from_value::<RecommendationConfig>(value).unwrap(), config);
    }

    #[test]
    fn test_exclusion_reason_priority_order() {
        assert!(ExclusionReason::DataUnavailable < ExclusionReason::LicenseInactive);
        assert!(ExclusionReason::SpecialtyMismatch < ExclusionReason::NoAvailability);
        assert_eq!(
            serde_json::to_string(&ExclusionReason::NoAvailability).unwrap(),
            "\"no_availability\""
        );
    }

    #[test]
    fn test_primary_profession_fallback() {
        let mut professional = Professional {
            id: "p1".to_string(),
            display_name: "Test".to_string(),
            email: None,
            phone: None,
            professions: vec![
                ProfessionAssignment { profession: "psychologue".to_string(), is_primary: false },
                ProfessionAssignment {
                    profession: "ergotherapeute".to_string(),
                    is_primary: false,
                },
            ],
            specialties: BTreeMap::new(),
            years_experience: 3,
            motifs: BTreeSet::new(),
            clienteles: BTreeSet::new(),
            demand_types: BTreeSet::new(),
            co_treatment: false,
            accepts_legal_mandates: false,
            license_status: LicenseStatus::Active,
        };
        assert_eq!(professional.primary_profession(), Some("ergotherapeute"));

        professional.professions[0].is_primary = true;
        assert_eq!(professional.primary_profession(), Some("psychologue"));
    }

    #[test]
    fn test_demand_type_parse_accepts_french_labels() {
        assert_eq!(DemandType::parse("Famille"), Some(DemandType::Family));
        assert_eq!(DemandType::parse("individuel"), Some(DemandType::Individual));
        assert_eq!(DemandType::parse("solo"), None);
    }
}
