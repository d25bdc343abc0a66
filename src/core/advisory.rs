use crate::core::sanitizer::AdvisoryInput;
use crate::error::AdvisoryError;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Advice for a single candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateAdvice {
    pub candidate_id: String,
    /// Additive adjustment proposed by the model, before bounding
    pub adjustment: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisoryOutput {
    #[serde(default)]
    pub adjustments: Vec<CandidateAdvice>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl AdvisoryOutput {
    /// Keep only well-formed advice for candidates that were actually sent.
    ///
    /// Unknown ids and non-finite numbers are dropped, confidence is clamped
    /// to [0, 1], and only the first advice per candidate is kept.
    pub fn retain_valid(self, input: &AdvisoryInput) -> BTreeMap<String, CandidateAdvice> {
        let known: BTreeSet<&str> = input.candidates.iter().map(|c| c.id.as_str()).collect();
        let mut advice = BTreeMap::new();

        for mut item in self.adjustments {
            if !known.contains(item.candidate_id.as_str()) {
                tracing::debug!("Dropping advice for unknown candidate {}", item.candidate_id);
                continue;
            }
            if !item.adjustment.is_finite() || !item.confidence.is_finite() {
                continue;
            }
            item.confidence = item.confidence.clamp(0.0, 1.0);
            advice.entry(item.candidate_id.clone()).or_insert(item);
        }

        advice
    }
}

/// External ranking/reasoning capability
pub trait Advisor: Send + Sync {
    fn advise<'a>(
        &'a self,
        model: &'a str,
        input: &'a AdvisoryInput,
    ) -> BoxFuture<'a, Result<AdvisoryOutput, AdvisoryError>>;
}

/// Advisor used when no advisory service is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAdvisor;

impl Advisor for DisabledAdvisor {
    fn advise<'a>(
        &'a self,
        _model: &'a str,
        _input: &'a AdvisoryInput,
    ) -> BoxFuture<'a, Result<AdvisoryOutput, AdvisoryError>> {
        Box::pin(async {
            Err(AdvisoryError::Unavailable(
                "no advisory service configured".to_string(),
            ))
        })
    }
}

/// Call the advisor under a timeout. Errors are returned to the caller, which
/// decides to fall back; nothing here is fatal.
pub async fn request_advice(
    advisor: &dyn Advisor,
    model: &str,
    input: &AdvisoryInput,
    timeout: Duration,
) -> Result<BTreeMap<String, CandidateAdvice>, AdvisoryError> {
    if input.candidates.is_empty() {
        return Ok(BTreeMap::new());
    }

    let output = tokio::time::timeout(timeout, advisor.advise(model, input))
        .await
        .map_err(|_| AdvisoryError::Timeout(timeout.as_millis() as u64))??;

    Ok(output.retain_valid(input))
}

/// System and user prompts for the advisory model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub system: String,
    pub user: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        let system = concat!(
            "You assist a clinic coordinator in matching a client request ",
            "with therapy professionals.\n",
            "You only see anonymised data. Never invent candidates ",
            "and never ask for personal details.\n",
            "Reply with strict JSON matching the requested schema."
        )
        .to_string();

        let user = concat!(
            "Review the request and the shortlisted candidates below. ",
            "Each candidate already has a ",
            "deterministic score in [0, 1]. For each candidate you may propose a small additive ",
            "adjustment in [-{max}, {max}] with a one-sentence reasoning ",
            "and a confidence in [0, 1].\n\n",
            "Respond with JSON of the form:\n",
            "{\n",
            "  \"adjustments\": [\n",
            "    {\"candidateId\": \"...\", \"adjustment\": 0.0, ",
            "\"reasoning\": \"...\", \"confidence\": 0.0}\n",
            "  ],\n",
            "  \"summary\": \"...\"\n",
            "}"
        )
        .to_string();

        Self { system, user }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    template: PromptTemplate,
}

impl PromptBuilder {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }

    /// Returns `(system, user)` prompts. The payload is the sanitized bundle
    /// serialized as JSON; nothing else from the request is interpolated.
    pub fn build(
        &self,
        input: &AdvisoryInput,
        max_adjustment: f64,
    ) -> Result<(String, String), serde_json::Error> {
        let payload = serde_json::to_string_pretty(input)?;
        let instructions = self
            .template
            .user
            .replace("{max}", &format!("{:.2}", max_adjustment));
        let user = format!("{}\n\nData:\n{}", instructions, payload);
        Ok((self.template.system.clone(), user))
    }
}
