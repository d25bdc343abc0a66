use crate::core::advisory::CandidateAdvice;
use crate::models::{
    DemandeRecommendation, ExclusionRecord, ExclusionSummary, GenerationMetadata, NearEligible,
    RankedProfessional, ScoredCandidate,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Bound an advisory adjustment: clamp to ±`max_adjustment`, scaled by the
/// model's confidence.
#[inline]
pub fn bounded_adjustment(advice: &CandidateAdvice, max_adjustment: f64) -> f64 {
    advice.adjustment.clamp(-max_adjustment, max_adjustment) * advice.confidence.clamp(0.0, 1.0)
}

/// Combine deterministic totals with any advice and rank.
///
/// Final ordering: final score desc, deterministic total desc, id asc.
/// Returns at most `max_results` entries with 1-based ranks.
pub fn merge_scores(
    scored: &[ScoredCandidate],
    advice: &BTreeMap<String, CandidateAdvice>,
    max_adjustment: f64,
    max_results: usize,
) -> Vec<RankedProfessional> {
    let mut ranked: Vec<RankedProfessional> = scored
        .iter()
        .map(|entry| {
            let id = entry.candidate.id();
            let deterministic = entry.scores.total;

            match advice.get(id) {
                Some(item) => {
                    let adjustment = bounded_adjustment(item, max_adjustment);
                    RankedProfessional {
                        professional_id: id.to_string(),
                        rank: 0,
                        final_score: (deterministic + adjustment).clamp(0.0, 1.0),
                        scores: entry.scores,
                        advisory_applied: true,
                        advisory_adjustment: Some(adjustment),
                        reasoning: item.reasoning.clone(),
                        confidence: Some(item.confidence),
                    }
                }
                None => RankedProfessional {
                    professional_id: id.to_string(),
                    rank: 0,
                    final_score: deterministic,
                    scores: entry.scores,
                    advisory_applied: false,
                    advisory_adjustment: None,
                    reasoning: None,
                    confidence: None,
                },
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.scores
                    .total
                    .partial_cmp(&a.scores.total)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.professional_id.cmp(&b.professional_id))
    });

    ranked.truncate(max_results);
    for (index, entry) in ranked.iter_mut().enumerate() {
        entry.rank = index + 1;
    }

    ranked
}

/// Assemble the final artifact
pub fn assemble(
    request_id: &str,
    ranked: Vec<RankedProfessional>,
    exclusions: Vec<ExclusionRecord>,
    near_eligible: Vec<NearEligible>,
    metadata: GenerationMetadata,
) -> DemandeRecommendation {
    DemandeRecommendation {
        request_id: request_id.to_string(),
        ranked,
        exclusions: ExclusionSummary::from_records(exclusions),
        near_eligible,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Candidate, DeterministicScores, LicenseStatus, Professional,
    };
    use std::collections::{BTreeMap, BTreeSet};

    fn create_scored(id: &str, total: f64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate {
                professional: Professional {
                    id: id.to_string(),
                    display_name: format!("Pro {}", id),
                    email: None,
                    phone: None,
                    professions: vec![],
                    specialties: BTreeMap::new(),
                    years_experience: 5,
                    motifs: BTreeSet::new(),
                    clienteles: BTreeSet::new(),
                    demand_types: BTreeSet::new(),
                    co_treatment: false,
                    accepts_legal_mandates: false,
                    license_status: LicenseStatus::Active,
                },
                available_slots: 5,
            },
            scores: DeterministicScores {
                motif: total,
                availability: total,
                experience: total,
                specialty: total,
                total,
            },
            matched_motifs: 0,
        }
    }

    fn advice(id: &str, adjustment: f64, confidence: f64) -> (String, CandidateAdvice) {
        (
            id.to_string(),
            CandidateAdvice {
                candidate_id: id.to_string(),
                adjustment,
                reasoning: Some("good fit for trauma work".to_string()),
                confidence,
            },
        )
    }

    #[test]
    fn test_without_advice_keeps_deterministic_order() {
        let scored = vec![create_scored("a", 0.9), create_scored("b", 0.5)];

        let ranked = merge_scores(&scored, &BTreeMap::new(), 0.1, 10);

        assert_eq!(ranked[0].professional_id, "a");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].final_score, 0.9);
        assert!(!ranked[0].advisory_applied);
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn test_adjustment_is_bounded() {
        let scored = vec![create_scored("a", 0.9), create_scored("b", 0.5)];
        let advice: BTreeMap<_, _> = [advice("b", 5.0, 1.0)].into_iter().collect();

        let ranked = merge_scores(&scored, &advice, 0.1, 10);

        // b cannot overtake a 0.4 deterministic gap
        assert_eq!(ranked[0].professional_id, "a");
        let b = &ranked[1];
        assert!(b.advisory_applied);
        assert!((b.final_score - 0.6).abs() < 1e-9);
        assert_eq!(b.reasoning.as_deref(), Some("good fit for trauma work"));
    }

    #[test]
    fn test_small_gap_can_be_reordered() {
        let scored = vec![create_scored("a", 0.62), create_scored("b", 0.60)];
        let advice: BTreeMap<_, _> = [advice("b", 0.08, 0.5)].into_iter().collect();

        let ranked = merge_scores(&scored, &advice, 0.1, 10);

        assert_eq!(ranked[0].professional_id, "b");
        assert!((ranked[0].final_score - 0.64).abs() < 1e-9);
    }

    #[test]
    fn test_final_score_stays_in_unit_range() {
        let scored = vec![create_scored("a", 0.98), create_scored("b", 0.02)];
        let advice: BTreeMap<_, _> = [advice("a", 0.1, 1.0), advice("b", -0.1, 1.0)]
            .into_iter()
            .collect();

        let ranked = merge_scores(&scored, &advice, 0.1, 10);

        assert_eq!(ranked[0].final_score, 1.0);
        assert_eq!(ranked[1].final_score, 0.0);
    }

    #[test]
    fn test_truncates_to_max_results() {
        let scored: Vec<_> = (0..8)
            .map(|i| create_scored(&format!("p{}", i), 0.1 * i as f64))
            .collect();

        let ranked = merge_scores(&scored, &BTreeMap::new(), 0.1, 3);

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].professional_id, "p7");
        assert_eq!(ranked[2].rank, 3);
    }
}
