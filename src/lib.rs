//! Demande Reco - recommendation engine matching client requests with
//! therapy professionals
//!
//! The pipeline collects the request, the professional roster and
//! availability, filters on hard eligibility rules, scores survivors
//! deterministically, optionally asks an advisory model for bounded
//! adjustments on sanitized data, then ranks and persists the result.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{EngineSettings, GenerateOptions, RecommendationEngine, Stores};
pub use error::{AdvisoryError, RecommendationError, StoreError};
pub use models::{DemandeRecommendation, DemandeRecord, Professional, RecommendationConfig};
