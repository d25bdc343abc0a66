use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::GenerateOptions;

/// Options for generating recommendations
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct GenerateRecommendationsRequest {
    #[validate(range(min = 1, max = 100))]
    #[serde(alias = "max_results", rename = "maxResults", default)]
    pub max_results: Option<usize>,
    #[serde(alias = "disable_advisory", rename = "disableAdvisory", default)]
    pub disable_advisory: bool,
    #[serde(alias = "as_of", rename = "asOf", default)]
    pub as_of: Option<NaiveDate>,
}

impl From<GenerateRecommendationsRequest> for GenerateOptions {
    fn from(value: GenerateRecommendationsRequest) -> Self {
        GenerateOptions {
            max_results: value.max_results,
            disable_advisory: value.disable_advisory,
            as_of: value.as_of,
        }
    }
}

/// Request to record that a recommendation was viewed
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LogViewRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "viewer_id", rename = "viewerId")]
    pub viewer_id: String,
    #[serde(alias = "viewed_at", rename = "viewedAt", default)]
    pub viewed_at: Option<DateTime<Utc>>,
}
