use crate::core::filters::count_matched_motifs;
use crate::models::{
    Candidate, DeterministicScores, RecommendationConfig, Request, ScoredCandidate, ScoringWeights,
};
use std::cmp::Ordering;

/// Calculate the deterministic scores (each in [0, 1]) for an eligible candidate
///
/// Scoring formula:
/// total = (
///     motif_score * w.motif +                # |requested ∩ treated| / |requested|
///     availability_score * w.availability +  # slots / target slots, capped
///     experience_score * w.experience +      # years / cap years, capped
///     specialty_score * w.specialty          # proficiency-weighted overlap
/// )
pub fn calculate_scores(
    candidate: &Candidate,
    request: &Request,
    config: &RecommendationConfig,
) -> (DeterministicScores, usize) {
    let matched_motifs = count_matched_motifs(request, candidate);

    let motif = calculate_motif_score(matched_motifs, request.motif_keys.len());
    let availability =
        calculate_ratio_score(candidate.available_slots, config.window_target_slots);
    let experience = calculate_ratio_score(
        candidate.professional.years_experience,
        config.experience_cap_years,
    );
    let specialty = calculate_specialty_score(candidate, request);

    let total = weighted_total(&config.weights, motif, availability, experience, specialty);

    (
        DeterministicScores {
            motif,
            availability,
            experience,
            specialty,
            total,
        },
        matched_motifs,
    )
}

#[inline]
pub fn weighted_total(
    weights: &ScoringWeights,
    motif: f64,
    availability: f64,
    experience: f64,
    specialty: f64,
) -> f64 {
    weights.motif * motif
        + weights.availability * availability
        + weights.experience * experience
        + weights.specialty * specialty
}

/// 0 when no motif was requested
#[inline]
fn calculate_motif_score(matched: usize, requested: usize) -> f64 {
    if requested == 0 {
        return 0.0;
    }
    (matched as f64 / requested as f64).clamp(0.0, 1.0)
}

/// min(value / target, 1)
#[inline]
fn calculate_ratio_score(value: u32, target: u32) -> f64 {
    if target == 0 {
        return 1.0;
    }
    (value as f64 / target as f64).min(1.0)
}

/// Average proficiency weight over the requested specialties; 1 when the
/// request names none
#[inline]
fn calculate_specialty_score(candidate: &Candidate, request: &Request) -> f64 {
    let requested = request.requested_specialties();
    if requested.is_empty() {
        return 1.0;
    }

    let sum: f64 = requested
        .iter()
        .filter_map(|code| candidate.professional.specialties.get(*code))
        .map(|proficiency| proficiency.weight())
        .sum();

    (sum / requested.len() as f64).clamp(0.0, 1.0)
}

/// Score every eligible candidate and sort descending by total, ties broken
/// by candidate id ascending.
pub fn score_candidates(
    candidates: Vec<Candidate>,
    request: &Request,
    config: &RecommendationConfig,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let (scores, matched_motifs) = calculate_scores(&candidate, request, config);
            ScoredCandidate {
                candidate,
                scores,
                matched_motifs,
            }
        })
        .collect();

    scored.sort_by(compare_scored);
    scored
}

#[inline]
pub fn compare_scored(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.scores
        .total
        .partial_cmp(&a.scores.total)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.candidate.id().cmp(b.candidate.id()))
}
