//! Privacy boundary. Nothing reaches the advisory service without going
//! through `sanitize`, and the output is re-checked before it is returned.

use crate::error::{RecommendationError, RecommendationResult};
use crate::models::{
    DemandType, PopulationCategory, Request, ScoredCandidate, UrgencyLevel,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Maximum length of the scrubbed description, in characters
pub const MAX_DESCRIPTION_LENGTH: usize = 2_000;

pub const EMAIL_TOKEN: &str = "[EMAIL]";
pub const PHONE_TOKEN: &str = "[PHONE]";
pub const POSTAL_CODE_TOKEN: &str = "[POSTAL_CODE]";
pub const NAME_TOKEN: &str = "[NAME]";

/// The only keys a sanitized candidate may carry
pub const ALLOWED_CANDIDATE_KEYS: [&str; 6] = [
    "id",
    "professionType",
    "deterministicScore",
    "matchedMotifCount",
    "availableSlots",
    "yearsExperience",
];

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}").unwrap()
});

static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?\d{1,2}[\s.-]?)?(?:\(\d{3}\)|\d{3})[\s.-]?\d{3}[\s.-]?\d{4}").unwrap()
});

// Canadian postal codes and US ZIP codes
static POSTAL_CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z]\d[a-z][ -]?\d[a-z]\d\b|\b\d{5}(?:-\d{4})?\b").unwrap()
});

// Honorific followed by one or two capitalised words
static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:Mr|Mrs|Ms|Miss|Dr|Dre|Mme|Mlle|M|Me|Pr|Madame|Monsieur|Mademoiselle|Docteur|Docteure)\.?\s+\p{Lu}[\p{L}'-]*(?:\s+\p{Lu}[\p{L}'-]*)?",
    )
    .unwrap()
});

fn patterns() -> [(&'static LazyLock<Regex>, &'static str); 4] {
    [
        (&EMAIL_PATTERN, EMAIL_TOKEN),
        (&PHONE_PATTERN, PHONE_TOKEN),
        (&POSTAL_CODE_PATTERN, POSTAL_CODE_TOKEN),
        (&NAME_PATTERN, NAME_TOKEN),
    ]
}

/// Replace phone numbers, emails, postal codes and honorific+surname
/// sequences with fixed placeholder tokens.
pub fn scrub_text(text: &str) -> String {
    let mut result = text.to_string();
    // Replacements can join fragments into a new match; repeat until stable
    for _ in 0..3 {
        let mut next = result.clone();
        for (pattern, token) in patterns() {
            next = pattern.replace_all(&next, token).into_owned();
        }
        if next == result {
            break;
        }
        result = next;
    }
    result
}

/// True if any of the PII patterns matches
pub fn contains_pii(text: &str) -> bool {
    patterns().iter().any(|(pattern, _)| pattern.is_match(text))
}

/// Truncate at a word boundary, counting characters
fn truncate_at_word_boundary(text: &str, max_chars: usize) -> String {
    let cut = match text.char_indices().nth(max_chars) {
        Some((index, _)) => index,
        None => return text.to_string(),
    };
    let truncated = &text[..cut];
    match truncated.rfind(char::is_whitespace) {
        Some(pos) => truncated[..pos].to_string(),
        None => truncated.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SanitizedRequest {
    pub demand_type: DemandType,
    pub urgency: UrgencyLevel,
    pub motif_keys: Vec<String>,
    pub required_specialties: Vec<String>,
    pub preferred_specialties: Vec<String>,
    pub population_categories: Vec<PopulationCategory>,
    pub legal_context: bool,
    pub description: Option<String>,
}

/// Candidate as it may leave the trust boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SanitizedCandidate {
    pub id: String,
    pub profession_type: Option<String>,
    pub deterministic_score: f64,
    pub matched_motif_count: usize,
    pub available_slots: u32,
    pub years_experience: u32,
}

impl SanitizedCandidate {
    /// Build from a field map, rejecting any key outside the allow-list.
    pub fn from_fields(fields: Map<String, Value>) -> RecommendationResult<Self> {
        check_candidate_keys(&fields)?;
        serde_json::from_value(Value::Object(fields)).map_err(|e| {
            RecommendationError::SanitizationViolation(format!(
                "malformed sanitized candidate: {}",
                e
            ))
        })
    }
}

fn check_candidate_keys(fields: &Map<String, Value>) -> RecommendationResult<()> {
    if let Some(extra) = fields
        .keys()
        .find(|key| !ALLOWED_CANDIDATE_KEYS.contains(&key.as_str()))
    {
        return Err(RecommendationError::SanitizationViolation(format!(
            "unexpected candidate field '{}'",
            extra
        )));
    }
    if let Some(missing) = ALLOWED_CANDIDATE_KEYS
        .iter()
        .find(|key| !fields.contains_key(**key))
    {
        return Err(RecommendationError::SanitizationViolation(format!(
            "missing candidate field '{}'",
            missing
        )));
    }
    Ok(())
}

/// Bundle sent to the advisory service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AdvisoryInput {
    pub request: SanitizedRequest,
    /// Sorted by deterministic score, best first
    pub candidates: Vec<SanitizedCandidate>,
}

impl AdvisoryInput {
    /// Re-check the serialized bundle against the allow-list and the PII
    /// patterns. Fails closed.
    pub fn verify(&self) -> RecommendationResult<()> {
        let value = serde_json::to_value(self).map_err(|e| {
            RecommendationError::SanitizationViolation(format!("unserializable bundle: {}", e))
        })?;

        let candidates = value
            .get("candidates")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                RecommendationError::SanitizationViolation("missing candidates array".to_string())
            })?;
        for candidate in candidates {
            let fields = candidate.as_object().ok_or_else(|| {
                RecommendationError::SanitizationViolation("candidate is not an object".to_string())
            })?;
            check_candidate_keys(fields)?;
        }

        if let Some(description) = &self.request.description {
            if contains_pii(description) {
                return Err(RecommendationError::SanitizationViolation(
                    "description still matches a PII pattern after scrubbing".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Stage 4: project the request and the scored candidates into the
/// allow-listed shape. At most `max_candidates` are kept, in score order.
pub fn sanitize(
    request: &Request,
    scored: &[ScoredCandidate],
    max_candidates: usize,
) -> RecommendationResult<AdvisoryInput> {
    let description = join_free_text(request)
        .map(|text| scrub_text(&text))
        .map(|text| truncate_at_word_boundary(&text, MAX_DESCRIPTION_LENGTH));

    let sanitized_request = SanitizedRequest {
        demand_type: request.demand_type,
        urgency: request.urgency,
        motif_keys: request.motif_keys.iter().cloned().collect(),
        required_specialties: request.required_specialties.iter().cloned().collect(),
        preferred_specialties: request.preferred_specialties.iter().cloned().collect(),
        population_categories: request.population_categories.iter().copied().collect(),
        legal_context: request.legal_context,
        description,
    };

    let candidates = scored
        .iter()
        .take(max_candidates)
        .map(project_candidate)
        .collect::<RecommendationResult<Vec<_>>>()?;

    let input = AdvisoryInput {
        request: sanitized_request,
        candidates,
    };

    if let Err(e) = input.verify() {
        tracing::error!("Sanitization violation for request {}: {}", request.id, e);
        return Err(e);
    }

    Ok(input)
}

fn project_candidate(scored: &ScoredCandidate) -> RecommendationResult<SanitizedCandidate> {
    let professional = &scored.candidate.professional;

    let mut fields = Map::new();
    fields.insert("id".to_string(), Value::from(professional.id.clone()));
    fields.insert(
        "professionType".to_string(),
        professional
            .primary_profession()
            .map(Value::from)
            .unwrap_or(Value::Null),
    );
    fields.insert("deterministicScore".to_string(), Value::from(scored.scores.total));
    fields.insert("matchedMotifCount".to_string(), Value::from(scored.matched_motifs));
    fields.insert(
        "availableSlots".to_string(),
        Value::from(scored.candidate.available_slots),
    );
    fields.insert(
        "yearsExperience".to_string(),
        Value::from(professional.years_experience),
    );

    SanitizedCandidate::from_fields(fields)
}

fn join_free_text(request: &Request) -> Option<String> {
    let parts: Vec<&str> = [request.description.as_deref(), request.clinical_notes.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Candidate, DeterministicScores, LicenseStatus, ProfessionAssignment, Professional,
    };
    use std::collections::{BTreeMap, BTreeSet};

    fn create_scored(id: &str, total: f64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate {
                professional: Professional {
                    id: id.to_string(),
                    display_name: "Julie Tremblay".to_string(),
                    email: Some("julie@clinique.ca".to_string()),
                    phone: Some("514-555-0199".to_string()),
                    professions: vec![ProfessionAssignment {
                        profession: "psychologue".to_string(),
                        is_primary: true,
                    }],
                    specialties: BTreeMap::new(),
                    years_experience: 7,
                    motifs: BTreeSet::new(),
                    clienteles: BTreeSet::new(),
                    demand_types: BTreeSet::new(),
                    co_treatment: false,
                    accepts_legal_mandates: false,
                    license_status: LicenseStatus::Active,
                },
                available_slots: 4,
            },
            scores: DeterministicScores {
                motif: 0.5,
                availability: 0.4,
                experience: 0.5,
                specialty: 1.0,
                total,
            },
            matched_motifs: 1,
        }
    }

    fn create_request(description: &str) -> Request {
        Request {
            id: "d1".to_string(),
            demand_type: DemandType::Individual,
            urgency: UrgencyLevel::Moderate,
            motif_keys: ["anxiety".to_string()].into_iter().collect(),
            required_specialties: BTreeSet::new(),
            preferred_specialties: BTreeSet::new(),
            description: Some(description.to_string()),
            clinical_notes: Some("Referred by Dr. Gagnon, call (514) 555-0123".to_string()),
            legal_context: false,
            population_categories: BTreeSet::new(),
        }
    }

    #[test]
    fn test_scrub_replaces_each_pattern() {
        let text = "Contact Mme Lavoie at marie.lavoie@example.com or 438.555.1234, \
                    lives near H2X 1Y4 / 90210.";
        let scrubbed = scrub_text(text);

        assert!(scrubbed.contains(NAME_TOKEN));
        assert!(scrubbed.contains(EMAIL_TOKEN));
        assert!(scrubbed.contains(PHONE_TOKEN));
        assert!(scrubbed.contains(POSTAL_CODE_TOKEN));
        assert!(!scrubbed.contains("Lavoie"));
        assert!(!scrubbed.contains("H2X"));
        assert!(!contains_pii(&scrubbed));
    }

    #[test]
    fn test_scrub_leaves_clinical_text_alone() {
        let text = "Difficulty sleeping for 3 months, panic attacks at work.";
        assert_eq!(scrub_text(text), text);
    }

    #[test]
    fn test_sanitized_candidate_has_only_allowed_keys() {
        let request = create_request("Anxiety since moving.");
        let input = sanitize(&request, &[create_scored("p1", 0.7)], 10).unwrap();

        let value = serde_json::to_value(&input.candidates[0]).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        let mut allowed: Vec<_> = ALLOWED_CANDIDATE_KEYS.iter().map(|k| k.to_string()).collect();
        allowed.sort();
        assert_eq!(keys, allowed);

        let serialized = serde_json::to_string(&input).unwrap();
        assert!(!serialized.contains("Julie"));
        assert!(!serialized.contains("julie@clinique.ca"));
        assert!(!serialized.contains("514"));
        assert!(!serialized.contains("Gagnon"));
    }

    #[test]
    fn test_extra_key_is_a_violation() {
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::from("p1"));
        fields.insert("professionType".to_string(), Value::from("psychologue"));
        fields.insert("deterministicScore".to_string(), Value::from(0.5));
        fields.insert("matchedMotifCount".to_string(), Value::from(1));
        fields.insert("availableSlots".to_string(), Value::from(3));
        fields.insert("yearsExperience".to_string(), Value::from(4));
        fields.insert("displayName".to_string(), Value::from("Julie Tremblay"));

        let result = SanitizedCandidate::from_fields(fields);

        assert!(matches!(
            result,
            Err(RecommendationError::SanitizationViolation(msg)) if msg.contains("displayName")
        ));
    }

    #[test]
    fn test_missing_key_is_a_violation() {
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::from("p1"));

        assert!(matches!(
            SanitizedCandidate::from_fields(fields),
            Err(RecommendationError::SanitizationViolation(_))
        ));
    }

    #[test]
    fn test_candidates_keep_score_order_and_limit() {
        let request = create_request("Anxiety.");
        let scored = vec![
            create_scored("a", 0.9),
            create_scored("b", 0.6),
            create_scored("c", 0.2),
        ];

        let input = sanitize(&request, &scored, 2).unwrap();

        let ids: Vec<_> = input.candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(input.candidates[0].profession_type.as_deref(), Some("psychologue"));
    }

    #[test]
    fn test_description_is_truncated_on_word_boundary() {
        let long = "word ".repeat(1_000);
        let request = create_request(&long);

        let input = sanitize(&request, &[], 10).unwrap();
        let description = input.request.description.unwrap();

        assert!(description.chars().count() <= MAX_DESCRIPTION_LENGTH);
        assert!(description.ends_with("word"));
    }

    #[test]
    fn test_truncate_handles_multibyte_characters() {
        let text = "é".repeat(10);
        assert_eq!(truncate_at_word_boundary(&text, 4), "éééé");
    }

    #[test]
    fn test_verify_rejects_residual_pii() {
        let input = AdvisoryInput {
            request: SanitizedRequest {
                demand_type: DemandType::Individual,
                urgency: UrgencyLevel::Low,
                motif_keys: vec![],
                required_specialties: vec![],
                preferred_specialties: vec![],
                population_categories: vec![],
                legal_context: false,
                description: Some("write to someone@example.org".to_string()),
            },
            candidates: vec![],
        };

        assert!(matches!(
            input.verify(),
            Err(RecommendationError::SanitizationViolation(_))
        ));
    }
}
