use crate::core::advisory::{Advisor, AdvisoryOutput, PromptBuilder};
use crate::core::sanitizer::AdvisoryInput;
use crate::error::AdvisoryError;
use futures_util::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Advisor backed by an Ollama-compatible `generate` endpoint
pub struct HttpAdvisor {
    endpoint: String,
    max_adjustment: f64,
    prompts: PromptBuilder,
    http: Client,
}

impl HttpAdvisor {
    pub fn new(
        endpoint: impl Into<String>,
        max_adjustment: f64,
        timeout: Duration,
    ) -> Result<Self, AdvisoryError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdvisoryError::Unavailable(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            max_adjustment,
            prompts: PromptBuilder::default(),
            http,
        })
    }

    async fn generate(
        &self,
        model: &str,
        input: &AdvisoryInput,
    ) -> Result<AdvisoryOutput, AdvisoryError> {
        let (system, prompt) = self
            .prompts
            .build(input, self.max_adjustment)
            .map_err(|e| AdvisoryError::InvalidResponse(e.to_string()))?;

        let payload = GenerateRequest {
            model,
            prompt: &prompt,
            system: &system,
            stream: false,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AdvisoryError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| AdvisoryError::Unavailable(e.to_string()))?;

        let raw: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AdvisoryError::InvalidResponse(e.to_string()))?;

        let value = extract_json_from_text(&raw.response)?;
        serde_json::from_value(value).map_err(|e| AdvisoryError::InvalidResponse(e.to_string()))
    }
}

impl Advisor for HttpAdvisor {
    fn advise<'a>(
        &'a self,
        model: &'a str,
        input: &'a AdvisoryInput,
    ) -> BoxFuture<'a, Result<AdvisoryOutput, AdvisoryError>> {
        Box::pin(self.generate(model, input))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Pull a JSON object out of free-form model text: the whole text, the
/// outermost braces, then fenced code blocks.
pub fn extract_json_from_text(s: &str) -> Result<Value, AdvisoryError> {
    let t = s.trim().trim_matches('\u{feff}');

    if let Ok(v) = serde_json::from_str::<Value>(t) {
        return Ok(v);
    }

    if let (Some(i), Some(j)) = (t.find('{'), t.rfind('}')) {
        if i < j {
            if let Ok(v) = serde_json::from_str::<Value>(&t[i..=j]) {
                return Ok(v);
            }
        }
    }

    for fence in ["```json", "```"] {
        if let Some(start) = t.find(fence) {
            let body = &t[start + fence.len()..];
            if let Some(end) = body.find("```") {
                if let Ok(v) = serde_json::from_str::<Value>(&body[..end]) {
                    return Ok(v);
                }
            }
        }
    }

    Err(AdvisoryError::InvalidResponse(
        "no valid JSON found in model output".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sanitizer::{SanitizedCandidate, SanitizedRequest};
    use crate::models::{DemandType, UrgencyLevel};
    use serde_json::json;

    fn create_input() -> AdvisoryInput {
        AdvisoryInput {
            request: SanitizedRequest {
                demand_type: DemandType::Couple,
                urgency: UrgencyLevel::Moderate,
                motif_keys: vec!["communication".to_string()],
                required_specialties: vec![],
                preferred_specialties: vec![],
                population_categories: vec![],
                legal_context: false,
                description: None,
            },
            candidates: vec![SanitizedCandidate {
                id: "pro-1".to_string(),
                profession_type: Some("sexologue".to_string()),
                deterministic_score: 0.7,
                matched_motif_count: 1,
                available_slots: 4,
                years_experience: 12,
            }],
        }
    }

    fn create_advisor(server: &mockito::ServerGuard) -> HttpAdvisor {
        let endpoint = format!("{}/api/generate", server.url());
        HttpAdvisor::new(endpoint, 0.1, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_extract_json_plain_and_wrapped() {
        assert_eq!(extract_json_from_text("{\"a\": 1}").unwrap(), json!({"a": 1}));
        assert_eq!(
            extract_json_from_text("Sure! Here you go: {\"a\": 2} Hope it helps.").unwrap(),
            json!({"a": 2})
        );
        assert_eq!(
            extract_json_from_text("```json\n[1, 2]\n```").unwrap(),
            json!([1, 2])
        );
        assert!(extract_json_from_text("no json here").is_err());
    }

    #[tokio::test]
    async fn test_advise_parses_model_output() {
        let mut server = mockito::Server::new_async().await;
        let advice = json!({"adjustments": [{
            "candidateId": "pro-1",
            "adjustment": 0.05,
            "reasoning": "couples focus",
            "confidence": 0.8
        }]});
        let model_text = format!("```json\n{}\n```", advice);
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::PartialJson(json!({"model": "llama3", "stream": false})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"response": model_text}).to_string())
            .create_async()
            .await;

        let advisor = create_advisor(&server);
        let output = advisor.advise("llama3", &create_input()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(output.adjustments.len(), 1);
        assert_eq!(output.adjustments[0].candidate_id, "pro-1");
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(500)
            .create_async()
            .await;

        let advisor = create_advisor(&server);
        let result = advisor.advise("llama3", &create_input()).await;

        assert!(matches!(result, Err(AdvisoryError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_unparseable_output_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(json!({"response": "I cannot help with that."}).to_string())
            .create_async()
            .await;

        let advisor = create_advisor(&server);
        let result = advisor.advise("llama3", &create_input()).await;

        assert!(matches!(result, Err(AdvisoryError::InvalidResponse(_))));
    }
}
