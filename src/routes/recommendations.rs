use actix_web::{web, HttpResponse, Responder};
use validator::Validate;
use crate::core::RecommendationEngine;
use crate::error::RecommendationError;
use crate::models::{
    DemandeRecommendation, ErrorResponse, GenerateRecommendationsRequest, HealthResponse,
    LogViewRequest, LogViewResponse,
};
use crate::services::{CacheKey, CacheManager, PostgresClient};
use std::sync::Arc;
use uuid::Uuid;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecommendationEngine>,
    pub cache: Option<Arc<CacheManager>>,
    pub postgres: Option<Arc<PostgresClient>>,
}

/// Configure all recommendation routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/demandes/{id}/recommendations", web::post().to(generate_recommendations))
        .route("/demandes/{id}/recommendations", web::get().to(fetch_recommendations))
        .route("/demandes/{id}/recommendations/views", web::post().to(log_view));
}

/// Map an engine error to its HTTP response
pub fn error_response(err: &RecommendationError) -> HttpResponse {
    let (mut builder, error, status_code) = match err {
        RecommendationError::RequestNotFound(_) => {
            (HttpResponse::NotFound(), "request_not_found", 404)
        }
        RecommendationError::InvalidConfig(_) => {
            (HttpResponse::UnprocessableEntity(), "invalid_config", 422)
        }
        RecommendationError::SanitizationViolation(_) => {
            (HttpResponse::InternalServerError(), "sanitization_violation", 500)
        }
        RecommendationError::Store(_) => {
            (HttpResponse::ServiceUnavailable(), "store_unavailable", 503)
        }
    };

    builder.json(ErrorResponse {
        error: error.to_string(),
        message: err.to_string(),
        status_code,
    })
}

fn validation_error(errors: validator::ValidationErrors) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: "Validation failed".to_string(),
        message: errors.to_string(),
        status_code: 400,
    })
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let db_healthy = match &state.postgres {
        Some(postgres) => postgres.health_check().await.unwrap_or(false),
        None => true,
    };

    let status = if db_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Generate recommendations
///
/// POST /api/v1/demandes/{id}/recommendations
///
/// Request body (optional, may be empty):
/// ```json
/// {
///   "maxResults": 10,
///   "disableAdvisory": false,
///   "asOf": "2026-03-01"
/// }
/// ```
async fn generate_recommendations(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> impl Responder {
    let request_id = path.into_inner();
    let req: GenerateRecommendationsRequest = if body.is_empty() {
        GenerateRecommendationsRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(e) => {
                return HttpResponse::BadRequest().json(ErrorResponse {
                    error: "invalid_json".to_string(),
                    message: format!("Invalid JSON: {}", e),
                    status_code: 400,
                });
            }
        }
    };

    if let Err(errors) = req.validate() {
        return validation_error(errors);
    }

    match state.engine.generate_recommendations(&request_id, req.into()).await {
        Ok(recommendation) => {
            if let Some(cache) = &state.cache {
                if let Err(e) = cache.delete(&CacheKey::recommendation(&request_id)).await {
                    tracing::warn!("Failed to invalidate cache for request {}: {}", request_id, e);
                }
            }
            HttpResponse::Ok().json(recommendation)
        }
        Err(e) => {
            tracing::error!("Failed to generate recommendations for {}: {}", request_id, e);
            error_response(&e)
        }
    }
}

/// Cached copy, only when it is the run the store currently holds
fn cached_if_current(
    cached: Option<DemandeRecommendation>,
    current_run: Uuid,
) -> Option<DemandeRecommendation> {
    cached.filter(|recommendation| recommendation.metadata.run_id == current_run)
}

fn recommendation_not_found(request_id: &str) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse {
        error: "recommendation_not_found".to_string(),
        message: format!("No recommendation stored for request {}", request_id),
        status_code: 404,
    })
}

/// Latest stored recommendations
///
/// GET /api/v1/demandes/{id}/recommendations
///
/// Cache entries are checked against the stored run id, so a copy cached by
/// another instance or by a read racing a generate is never served stale.
async fn fetch_recommendations(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let request_id = path.into_inner();
    let cache_key = CacheKey::recommendation(&request_id);

    let current_run = match state.engine.latest_run_id(&request_id).await {
        Ok(Some(run_id)) => run_id,
        Ok(None) => return recommendation_not_found(&request_id),
        Err(e) => {
            tracing::error!("Failed to fetch recommendations for {}: {}", request_id, e);
            return error_response(&e);
        }
    };

    if let Some(cache) = &state.cache {
        let cached = cache.get::<DemandeRecommendation>(&cache_key).await.ok();
        if let Some(recommendation) = cached_if_current(cached, current_run) {
            return HttpResponse::Ok().json(recommendation);
        }
    }

    match state.engine.fetch_recommendations(&request_id).await {
        Ok(Some(recommendation)) => {
            if let Some(cache) = &state.cache {
                if let Err(e) = cache.set(&cache_key, &recommendation).await {
                    tracing::warn!("Failed to cache recommendation for {}: {}", request_id, e);
                }
            }
            HttpResponse::Ok().json(recommendation)
        }
        Ok(None) => recommendation_not_found(&request_id),
        Err(e) => {
            tracing::error!("Failed to fetch recommendations for {}: {}", request_id, e);
            error_response(&e)
        }
    }
}

/// Record that a coordinator viewed the recommendations
///
/// POST /api/v1/demandes/{id}/recommendations/views
///
/// Request body:
/// ```json
/// {
///   "viewerId": "string",
///   "viewedAt": "2026-03-01T10:00:00Z"
/// }
/// ```
async fn log_view(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<LogViewRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_error(errors);
    }

    let request_id = path.into_inner();
    let viewed_at = req.viewed_at.unwrap_or_else(chrono::Utc::now);

    match state
        .engine
        .log_recommendation_view(&request_id, &req.viewer_id, viewed_at)
        .await
    {
        Ok(view) => HttpResponse::Ok().json(LogViewResponse {
            success: true,
            event_id: view.event_id.to_string(),
        }),
        Err(e) => {
            tracing::error!("Failed to log view for {}: {}", request_id, e);
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EngineSettings, GenerateOptions, Stores};
    use crate::error::StoreError;
    use crate::models::{DemandType, DemandeRecord, UrgencyLevel};
    use crate::services::InMemoryStore;
    use actix_web::{http::StatusCode, test as web_test, App};
    use std::collections::BTreeSet;

    fn create_state(store: Arc<InMemoryStore>) -> AppState {
        AppState {
            engine: Arc::new(RecommendationEngine::deterministic(
                Stores::shared(store),
                EngineSettings::default(),
            )),
            cache: None,
            postgres: None,
        }
    }

    fn create_record(id: &str) -> DemandeRecord {
        DemandeRecord {
            id: id.to_string(),
            demand_type: DemandType::Individual,
            urgency: UrgencyLevel::Moderate,
            motif_keys: BTreeSet::new(),
            required_specialties: BTreeSet::new(),
            preferred_specialties: BTreeSet::new(),
            description: None,
            clinical_notes: None,
            legal_context: false,
            participant_birthdates: vec![],
        }
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (RecommendationError::RequestNotFound("d".into()), StatusCode::NOT_FOUND),
            (RecommendationError::InvalidConfig("w".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (
                RecommendationError::SanitizationViolation("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                RecommendationError::Store(StoreError::Unavailable("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(error_response(&err).status(), status);
        }
    }

    #[actix_web::test]
    async fn test_generate_unknown_request_is_404() {
        let state = create_state(Arc::new(InMemoryStore::new()));
        let app = web_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(web::scope("/api/v1").configure(configure)),
        )
        .await;

        let req = web_test::TestRequest::post()
            .uri("/api/v1/demandes/missing/recommendations")
            .set_json(serde_json::json!({}))
            .to_request();
        let resp = web_test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_generate_then_fetch() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_request(create_record("d-1"));
        let app = web_test::init_service(
            App::new()
                .app_data(web::Data::new(create_state(store)))
                .service(web::scope("/api/v1").configure(configure)),
        )
        .await;

        let req = web_test::TestRequest::get()
            .uri("/api/v1/demandes/d-1/recommendations")
            .to_request();
        assert_eq!(web_test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = web_test::TestRequest::post()
            .uri("/api/v1/demandes/d-1/recommendations")
            .set_json(serde_json::json!({"maxResults": 5}))
            .to_request();
        assert_eq!(web_test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = web_test::TestRequest::get()
            .uri("/api/v1/demandes/d-1/recommendations")
            .to_request();
        let body: serde_json::Value = web_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["requestId"], "d-1");
    }

    #[actix_web::test]
    async fn test_cached_copy_served_only_for_current_run() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_request(create_record("d-1"));
        let state = create_state(store);

        let older = state
            .engine
            .generate_recommendations("d-1", GenerateOptions::default())
            .await
            .unwrap();
        let newer = state
            .engine
            .generate_recommendations("d-1", GenerateOptions::default())
            .await
            .unwrap();
        let current = state.engine.latest_run_id("d-1").await.unwrap().unwrap();

        assert_eq!(current, newer.metadata.run_id);
        assert!(cached_if_current(Some(older), current).is_none());
        assert!(cached_if_current(None, current).is_none());
        assert_eq!(cached_if_current(Some(newer.clone()), current), Some(newer));
    }

    #[actix_web::test]
    async fn test_log_view_validates_viewer() {
        let store = Arc::new(InMemoryStore::new());
        let app = web_test::init_service(
            App::new()
                .app_data(web::Data::new(create_state(store.clone())))
                .service(web::scope("/api/v1").configure(configure)),
        )
        .await;

        let req = web_test::TestRequest::post()
            .uri("/api/v1/demandes/d-1/recommendations/views")
            .set_json(serde_json::json!({"viewerId": ""}))
            .to_request();
        assert_eq!(web_test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = web_test::TestRequest::post()
            .uri("/api/v1/demandes/d-1/recommendations/views")
            .set_json(serde_json::json!({"viewerId": "coordinator-7"}))
            .to_request();
        assert_eq!(web_test::call_service(&app, req).await.status(), StatusCode::OK);
        assert_eq!(store.views().len(), 1);
    }
}
