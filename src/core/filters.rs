use crate::models::{
    Candidate, ExclusionReason, ExclusionRecord, LicenseStatus, NearEligible, RecommendationConfig,
    Request, SoftCriterion,
};

/// Output of the eligibility stage
#[derive(Debug, Clone, Default)]
pub struct EligibilityOutcome {
    pub eligible: Vec<Candidate>,
    pub excluded: Vec<ExclusionRecord>,
    pub near_eligible: Vec<NearEligible>,
}

/// Check the hard rules in priority order, returning the first one failed.
///
/// This is Stage 2 of the pipeline. Rules are evaluated in the same order as
/// `ExclusionReason` is declared so the reported reason is deterministic.
pub fn check_hard_rules(
    candidate: &Candidate,
    request: &Request,
    config: &RecommendationConfig,
) -> Option<(ExclusionReason, String)> {
    let professional = &candidate.professional;

    if professional.license_status != LicenseStatus::Active {
        return Some((
            ExclusionReason::LicenseInactive,
            format!("license status is {:?}", professional.license_status).to_lowercase(),
        ));
    }

    if !professional.demand_types.contains(&request.demand_type) {
        return Some((
            ExclusionReason::DemandTypeIncompatible,
            format!("does not take {:?} requests", request.demand_type).to_lowercase(),
        ));
    }

    if config.co_treatment_demand_types.contains(&request.demand_type)
        && !professional.co_treatment
    {
        return Some((
            ExclusionReason::DemandTypeIncompatible,
            format!("{:?} requests require a co-treating professional", request.demand_type)
                .to_lowercase(),
        ));
    }

    let missing_clienteles: Vec<String> = request
        .population_categories
        .iter()
        .filter(|category| !professional.clienteles.contains(*category))
        .map(|category| format!("{:?}", category).to_lowercase())
        .collect();
    if !missing_clienteles.is_empty() {
        return Some((
            ExclusionReason::ClienteleIneligible,
            format!("does not serve: {}", missing_clienteles.join(", ")),
        ));
    }

    let missing_specialties: Vec<&str> = request
        .required_specialties
        .iter()
        .filter(|code| !professional.specialties.contains_key(*code))
        .map(String::as_str)
        .collect();
    if !missing_specialties.is_empty() {
        return Some((
            ExclusionReason::SpecialtyMismatch,
            format!("missing required specialties: {}", missing_specialties.join(", ")),
        ));
    }

    if request.legal_context && !professional.accepts_legal_mandates {
        return Some((
            ExclusionReason::LegalContextUnsupported,
            "does not accept legal-context mandates".to_string(),
        ));
    }

    if candidate.available_slots == 0 {
        return Some((
            ExclusionReason::NoAvailability,
            format!("no open slot in the next {} days", config.lookahead_days),
        ));
    }

    None
}

/// Check the soft criteria in priority order, returning the first one missed
/// with the size of the gap.
pub fn check_soft_criteria(
    candidate: &Candidate,
    request: &Request,
    config: &RecommendationConfig,
) -> Option<(SoftCriterion, f64, String)> {
    let professional = &candidate.professional;

    if candidate.available_slots < config.comfortable_slots {
        let short = config.comfortable_slots - candidate.available_slots;
        let unit = if short == 1 { "slot" } else { "slots" };
        return Some((
            SoftCriterion::ComfortableAvailability,
            short as f64,
            format!("{} {} short", short, unit),
        ));
    }

    if professional.years_experience < config.min_years_experience {
        let short = config.min_years_experience - professional.years_experience;
        let unit = if short == 1 { "year" } else { "years" };
        return Some((
            SoftCriterion::MinimumExperience,
            short as f64,
            format!("{} {} of experience short", short, unit),
        ));
    }

    if !request.motif_keys.is_empty() && config.min_motif_coverage > 0.0 {
        let coverage = motif_coverage(request, candidate);
        if coverage < config.min_motif_coverage {
            let gap = config.min_motif_coverage - coverage;
            return Some((
                SoftCriterion::MotifCoverage,
                gap,
                format!(
                    "motif coverage {:.2} below {:.2}",
                    coverage, config.min_motif_coverage
                ),
            ));
        }
    }

    None
}

/// Fraction of the requested motifs the candidate treats
#[inline]
pub fn motif_coverage(request: &Request, candidate: &Candidate) -> f64 {
    if request.motif_keys.is_empty() {
        return 0.0;
    }
    let matched = count_matched_motifs(request, candidate);
    matched as f64 / request.motif_keys.len() as f64
}

#[inline]
pub fn count_matched_motifs(request: &Request, candidate: &Candidate) -> usize {
    request
        .motif_keys
        .intersection(&candidate.professional.motifs)
        .count()
}

/// Split the candidate pool into eligible, excluded and near-eligible sets.
///
/// Hard rules take precedence: a candidate failing any hard rule is excluded
/// even when it also misses a soft criterion. Exclusions and near-eligibles
/// are sorted by reason priority, then candidate id.
pub fn apply_eligibility(
    candidates: Vec<Candidate>,
    request: &Request,
    config: &RecommendationConfig,
) -> EligibilityOutcome {
    let mut outcome = EligibilityOutcome::default();

    for candidate in candidates {
        if let Some((reason, detail)) = check_hard_rules(&candidate, request, config) {
            outcome.excluded.push(ExclusionRecord {
                candidate_id: candidate.professional.id,
                reason,
                detail,
            });
            continue;
        }

        if let Some((criterion, gap, gap_description)) =
            check_soft_criteria(&candidate, request, config)
        {
            outcome.near_eligible.push(NearEligible {
                candidate_id: candidate.professional.id,
                criterion,
                gap,
                gap_description,
            });
            continue;
        }

        outcome.eligible.push(candidate);
    }

    sort_exclusions(&mut outcome.excluded);
    outcome.near_eligible.sort_by(|a, b| {
        a.criterion
            .cmp(&b.criterion)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });
    outcome.eligible.sort_by(|a, b| a.id().cmp(b.id()));

    outcome
}

pub fn sort_exclusions(records: &mut [ExclusionRecord]) {
    records.sort_by(|a, b| {
        a.reason
            .cmp(&b.reason)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });
}
