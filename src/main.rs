use actix_cors::Cors;
use actix_web::{web, App, HttpServer, HttpResponse, middleware, error, http::StatusCode};
use demande_reco::config::{LoggingSettings, Settings};
use demande_reco::core::{Advisor, DisabledAdvisor, RecommendationEngine, Stores};
use demande_reco::routes::{self, recommendations::AppState};
use demande_reco::services::{
    CacheManager, DirectoryClient, DirectoryCollections, HttpAdvisor, InMemoryStore, PostgresClient,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, error};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST);
        HttpResponse::build(status).json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(
    err: error::JsonPayloadError,
    req: &actix_web::HttpRequest,
) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle path errors
pub fn handle_path_error(err: error::PathError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_path".to_string(),
        message: format!("Invalid path: {}", err),
        status_code: 400,
    }
    .into()
}

/// `LOG_LEVEL` and `LOG_FORMAT` override the `[logging]` section
fn init_logging(logging: &LoggingSettings) {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| logging.level.clone());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| logging.format.clone());

    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }
}

fn io_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let loaded = Settings::load();
    match &loaded {
        Ok(settings) => init_logging(&settings.logging),
        Err(_) => init_logging(&LoggingSettings::default()),
    }

    info!("Starting recommendation service...");

    let settings = loaded.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        io_error("Configuration error", e)
    })?;

    info!("Configuration loaded successfully");

    // Stores default to memory; each configured backend replaces its roles
    let memory = Arc::new(InMemoryStore::new());
    let mut stores = Stores::shared(memory);

    match &settings.directory {
        Some(directory) => {
            let collections = DirectoryCollections {
                demandes: directory.demandes_collection.clone(),
                professionals: directory.professionals_collection.clone(),
                availability_slots: directory.availability_collection.clone(),
            };

            let client = Arc::new(
                DirectoryClient::new(
                    directory.endpoint.clone(),
                    directory.api_key.clone(),
                    directory.project_id.clone(),
                    directory.database_id.clone(),
                    collections,
                    Duration::from_secs(directory.timeout_secs.unwrap_or(10)),
                )
                .map_err(|e| io_error("Directory client error", e))?,
            );

            stores.requests = client.clone();
            stores.professionals = client;
            info!("Directory client initialized");
        }
        None => warn!("No directory configured, requests and roster are in-memory"),
    }

    let postgres = match &settings.database {
        Some(database) => {
            let db_max_conn = database.max_connections.unwrap_or(10);

            let client = Arc::new(
                PostgresClient::from_settings(
                    &database.url,
                    Some(db_max_conn),
                    database.min_connections,
                    database.acquire_timeout_secs,
                    database.idle_timeout_secs,
                )
                .await
                .map_err(|e| {
                    error!("Failed to connect to PostgreSQL: {}", e);
                    io_error("PostgreSQL connection error", e)
                })?,
            );

            stores.configs = client.clone();
            stores.recommendations = client.clone();
            info!("PostgreSQL client initialized (max: {} connections)", db_max_conn);
            Some(client)
        }
        None => {
            warn!("No database configured, recommendations are kept in memory");
            None
        }
    };

    // The read cache is optional; the service works without it
    let cache = match &settings.cache {
        Some(cache_settings) => {
            let cache_ttl = cache_settings.ttl_secs.unwrap_or(300);
            let l1_cache_size = cache_settings.l1_cache_size.unwrap_or(1000);

            match CacheManager::new(&cache_settings.redis_url, l1_cache_size, cache_ttl).await {
                Ok(c) => {
                    info!(
                        "Cache manager initialized (L1: {} entries, TTL: {}s)",
                        l1_cache_size, cache_ttl
                    );
                    Some(Arc::new(c))
                }
                Err(e) => {
                    warn!("Failed to connect to Redis ({}), running without cache", e);
                    None
                }
            }
        }
        None => None,
    };

    let engine_settings = settings.engine_settings();

    let advisor: Arc<dyn Advisor> = match &settings.advisory.endpoint {
        Some(endpoint) => {
            let advisor = HttpAdvisor::new(
                endpoint.clone(),
                settings.advisory.max_adjustment,
                engine_settings.advisory_timeout,
            )
            .map_err(|e| io_error("Advisory client error", e))?;
            info!("Advisory client initialized ({} ms timeout)", settings.advisory.timeout_ms);
            Arc::new(advisor)
        }
        None => {
            info!("No advisory endpoint configured, running deterministic only");
            Arc::new(DisabledAdvisor)
        }
    };

    let engine = Arc::new(RecommendationEngine::new(stores, advisor, engine_settings));

    info!("Recommendation engine initialized: {:?}", engine_settings);

    let app_state = AppState {
        engine,
        cache,
        postgres,
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::PathConfig::default().error_handler(handle_path_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
