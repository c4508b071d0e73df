//! Web server implementation

use crate::config::WarpgenConfig;
use crate::pipeline::Generator;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderName, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use warpgen_common::{
    Error, GenerationResult, IpRangeAggregator, ServiceDirectory, ServiceInfo,
};

/// CORS headers sent with every response of the generation endpoint
const WARP_CORS: [(HeaderName, &str); 3] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
];

/// Shared state, built once at startup
pub struct WebServerState {
    pub generator: Generator,
    pub directory: ServiceDirectory,
}

/// HTTP front end for the generator
#[derive(Clone)]
pub struct WebServer {
    state: Arc<WebServerState>,
}

impl WebServer {
    pub fn new(generator: Generator, directory: ServiceDirectory) -> Self {
        Self {
            state: Arc::new(WebServerState {
                generator,
                directory,
            }),
        }
    }

    pub fn from_config(config: &WarpgenConfig) -> warpgen_common::Result<Self> {
        let generator = Generator::from_config(config)?;
        let directory = ServiceDirectory::load_or_bundled(config.data.services_path.as_deref())?;
        Ok(Self::new(generator, directory))
    }

    pub fn state(&self) -> &Arc<WebServerState> {
        &self.state
    }

    /// Create the router
    pub fn router(&self) -> Router {
        // Read-only endpoints use the stock CORS layer; the generation
        // endpoint answers its own preflight.
        let read_only = Router::new()
            .route("/api/health", get(health_handler))
            .route("/api/services", get(services_handler))
            .route("/api/stats", get(stats_handler))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([Method::GET]),
            );

        Router::new()
            .route(
                "/api/warp",
                post(generate_handler).options(preflight_handler),
            )
            .merge(read_only)
            .fallback(not_found_handler)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the web server
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        info!("warpgen listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateResponse {
    success: bool,
    content: GenerationResult,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceEntry<'a> {
    #[serde(flatten)]
    info: &'a ServiceInfo,
    has_ranges: bool,
}

/// Query string of `GET /api/services`
#[derive(Debug, Default, Deserialize)]
struct ServicesQuery {
    /// Only list recently added services
    #[serde(default)]
    new: bool,
}

/// Failure of the generation endpoint, as seen by the caller
#[derive(Debug)]
pub enum ApiError {
    /// Bad input; the reason is safe to echo back
    Validation(String),
    /// Provider or key generation failure; detail stays in the logs
    Upstream,
    /// Anything else
    Unexpected,
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Validation(reason) => ApiError::Validation(reason),
            e if e.is_upstream() => ApiError::Upstream,
            e => {
                error!(kind = e.kind(), "Unexpected generation failure: {}", e);
                ApiError::Unexpected
            }
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Upstream => StatusCode::BAD_REQUEST,
            ApiError::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Validation(reason) => format!("Generation error: {}", reason),
            ApiError::Upstream => "Generation error: failed to generate configuration".to_string(),
            ApiError::Unexpected => "Unexpected server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            WARP_CORS,
            Json(serde_json::json!({
                "success": false,
                "message": self.message(),
            })),
        )
            .into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn generate_handler(
    State(state): State<Arc<WebServerState>>,
    payload: Result<Json<warpgen_common::GenerationRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            state.generator.stats().record_malformed();
            return ApiError::Validation(format!("invalid request body: {}", rejection.body_text()))
                .into_response();
        }
    };

    match state.generator.generate(&request).await {
        Ok(generation) => (
            StatusCode::OK,
            WARP_CORS,
            Json(GenerateResponse {
                success: true,
                content: generation.result,
                warnings: generation.warnings,
            }),
        )
            .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn preflight_handler() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, WARP_CORS)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "warpgen-web"
    }))
}

async fn services_handler(
    State(state): State<Arc<WebServerState>>,
    Query(query): Query<ServicesQuery>,
) -> impl IntoResponse {
    let catalog = state.generator.catalog();
    let aggregator = IpRangeAggregator::new(catalog);
    let listed: Vec<&ServiceInfo> = if query.new {
        state.directory.new_services().collect()
    } else {
        state.directory.all().iter().collect()
    };
    let services: Vec<ServiceEntry<'_>> = listed
        .into_iter()
        .map(|info| ServiceEntry {
            info,
            has_ranges: !aggregator.ranges_for(&info.key).is_empty(),
        })
        .collect();

    Json(serde_json::json!({
        "services": services,
        "total": services.len(),
    }))
}

async fn stats_handler(State(state): State<Arc<WebServerState>>) -> impl IntoResponse {
    let catalog = state.generator.catalog();
    let keys: Vec<String> = catalog.keys().map(str::to_string).collect();
    let ranges = IpRangeAggregator::new(catalog).stats(&keys);

    Json(serde_json::json!({
        "generation": state.generator.stats().snapshot(),
        "catalog": ranges,
    }))
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "success": false,
            "message": "Not found"
        })),
    )
}
