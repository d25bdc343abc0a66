// Criterion benchmarks for the recommendation stages

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use demande_reco::core::advisory::CandidateAdvice;
use demande_reco::core::merger::merge_scores;
use demande_reco::core::sanitizer::scrub_text;
use demande_reco::core::{apply_eligibility, sanitize, score_candidates};
use demande_reco::models::{
    Candidate, DemandType, LicenseStatus, PopulationCategory, Proficiency, Professional,
    RecommendationConfig, Request, UrgencyLevel,
};
use std::collections::{BTreeMap, BTreeSet};

const MOTIFS: [&str; 6] = [
    "anxiety",
    "grief",
    "trauma",
    "depression",
    "burnout",
    "couple_conflict",
];

fn create_candidate(id: usize) -> Candidate {
    let motifs = MOTIFS
        .iter()
        .enumerate()
        .filter(|(i, _)| (id + i) % 3 != 0)
        .map(|(_, m)| m.to_string())
        .collect();

    let mut specialties = BTreeMap::new();
    if id % 2 == 0 {
        specialties.insert("tcc".to_string(), Proficiency::Expert);
    }
    if id % 5 == 0 {
        specialties.insert("emdr".to_string(), Proficiency::Basic);
    }

    Candidate {
        professional: Professional {
            id: format!("pro-{:05}", id),
            display_name: format!("Pro {}", id),
            email: None,
            phone: None,
            professions: vec![],
            specialties,
            years_experience: (id % 25) as u32,
            motifs,
            clienteles: [PopulationCategory::Adult, PopulationCategory::Senior]
                .into_iter()
                .collect(),
            demand_types: [DemandType::Individual].into_iter().collect(),
            co_treatment: id % 4 == 0,
            accepts_legal_mandates: id % 3 == 0,
            license_status: if id % 17 == 0 {
                LicenseStatus::Inactive
            } else {
                LicenseStatus::Active
            },
        },
        available_slots: (id % 12) as u32,
    }
}

fn create_request() -> Request {
    Request {
        id: "d-bench".to_string(),
        demand_type: DemandType::Individual,
        urgency: UrgencyLevel::High,
        motif_keys: ["anxiety", "grief", "trauma"].iter().map(|m| m.to_string()).collect(),
        required_specialties: BTreeSet::new(),
        preferred_specialties: ["tcc".to_string(), "emdr".to_string()].into_iter().collect(),
        description: Some(
            "Panic attacks since the loss of a parent, difficulty sleeping".to_string(),
        ),
        clinical_notes: None,
        legal_context: false,
        population_categories: [PopulationCategory::Adult].into_iter().collect(),
    }
}

fn bench_eligibility_and_scoring(c: &mut Criterion) {
    let config = RecommendationConfig::default();
    let request = create_request();

    let mut group = c.benchmark_group("eligibility_and_scoring");

    for candidate_count in [10, 50, 100, 500, 1000].iter() {
        let candidates: Vec<Candidate> = (0..*candidate_count).map(create_candidate).collect();

        group.bench_with_input(
            BenchmarkId::new("filter_score_rank", candidate_count),
            candidate_count,
            |b, _| {
                b.iter(|| {
                    let outcome =
                        apply_eligibility(black_box(candidates.clone()), &request, &config);
                    let scored = score_candidates(outcome.eligible, &request, &config);
                    merge_scores(
                        &scored,
                        &BTreeMap::new(),
                        config.advisory_max_adjustment,
                        config.max_results,
                    )
                });
            },
        );
    }

    group.finish();
}

fn bench_merge_with_advice(c: &mut Criterion) {
    let config = RecommendationConfig::default();
    let request = create_request();
    let candidates: Vec<Candidate> = (0..200).map(create_candidate).collect();
    let eligible = apply_eligibility(candidates, &request, &config).eligible;
    let scored = score_candidates(eligible, &request, &config);

    let advice: BTreeMap<String, CandidateAdvice> = scored
        .iter()
        .take(20)
        .enumerate()
        .map(|(i, s)| {
            let id = s.candidate.id().to_string();
            let item = CandidateAdvice {
                candidate_id: id.clone(),
                adjustment: if i % 2 == 0 { 0.05 } else { -0.05 },
                reasoning: None,
                confidence: 0.8,
            };
            (id, item)
        })
        .collect();

    c.bench_function("merge_200_with_20_advised", |b| {
        b.iter(|| merge_scores(black_box(&scored), black_box(&advice), 0.1, 10));
    });
}

fn bench_sanitization(c: &mut Criterion) {
    let config = RecommendationConfig::default();
    let mut request = create_request();
    request.description = Some(
        "Referred by Dr. Martin Dubois, call (514) 555-0142 or write to client@example.com. "
            .repeat(20),
    );
    let candidates: Vec<Candidate> = (0..100).map(create_candidate).collect();
    let eligible = apply_eligibility(candidates, &request, &config).eligible;
    let scored = score_candidates(eligible, &request, &config);

    c.bench_function("scrub_text", |b| {
        let text = request.description.clone().unwrap_or_default();
        b.iter(|| scrub_text(black_box(&text)));
    });

    c.bench_function("sanitize_top_20", |b| {
        b.iter(|| sanitize(black_box(&request), black_box(&scored), 20));
    });
}

criterion_group!(
    benches,
    bench_eligibility_and_scoring,
    bench_merge_with_advice,
    bench_sanitization
);

criterion_main!(benches);
