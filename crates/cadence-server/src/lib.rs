//! Cadence Web Server
//!
//! Axum-based REST API over the subscription suggestion workflow.
//!
//! Security features:
//! - API key authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use cadence_core::icons::IconSource;
use cadence_core::{CadenceConfig, Database, HttpIconSource, NbuRateSource, RateSource};

mod handlers;
mod scheduler;

pub use scheduler::{start_generation_scheduler, GenerationScheduleConfig};

/// Environment variable holding comma-separated API keys
pub const API_KEYS_ENV: &str = "CADENCE_API_KEYS";

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// Accepted keys, sent as "Bearer <key>" in the Authorization header
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
        }
    }
}

/// Parse API keys from a comma-separated list
pub fn parse_api_keys(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub cadence: CadenceConfig,
    /// Exchange rates fetched ahead of detection; cache only when None
    pub rates: Option<Arc<dyn RateSource>>,
    /// Icon downloads after approval; skipped when None
    pub icons: Option<Arc<dyn IconSource>>,
}

impl AppState {
    /// Build state with HTTP rate and icon sources from the Cadence config
    pub fn new(db: Database, config: ServerConfig, cadence: CadenceConfig) -> Self {
        let rates = match NbuRateSource::from_config(&cadence.rates) {
            Ok(source) => Some(Arc::new(source) as Arc<dyn RateSource>),
            Err(e) => {
                warn!("Exchange rate client unavailable: {}", e);
                None
            }
        };

        let icons = if cadence.icons.enabled() {
            match HttpIconSource::new(&cadence.icons) {
                Ok(source) => Some(Arc::new(source) as Arc<dyn IconSource>),
                Err(e) => {
                    warn!("Icon client unavailable: {}", e);
                    None
                }
            }
        } else {
            info!("Icon caching disabled (no brandfetch_client_id configured)");
            None
        };

        Self {
            db,
            config,
            cadence,
            rates,
            icons,
        }
    }
}

/// Authentication middleware - validates API keys
///
/// Keys are compared in constant time.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid API key");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    valid_keys.iter().any(|key| {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes))
    })
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(db: Database, config: ServerConfig, cadence: CadenceConfig) -> Router {
    let state = Arc::new(AppState::new(db, config, cadence));
    create_router_with_state(state)
}

/// Create the application router around prepared state (for testing)
pub fn create_router_with_state(state: Arc<AppState>) -> Router {
    let family_routes = Router::new()
        .route("/", get(handlers::get_family))
        .route("/accounts", get(handlers::list_accounts))
        // Suggestions
        .route("/suggestions", get(handlers::list_suggestions))
        .route("/suggestions/detect", post(handlers::run_detection))
        .route("/suggestions/approve-all", post(handlers::approve_all_suggestions))
        .route("/suggestions/dismiss-all", post(handlers::dismiss_all_suggestions))
        .route("/suggestions/:id/approve", post(handlers::approve_suggestion))
        .route("/suggestions/:id/dismiss", post(handlers::dismiss_suggestion))
        // Subscriptions
        .route(
            "/subscriptions",
            get(handlers::list_subscriptions).post(handlers::create_subscription),
        )
        .route("/subscriptions/summary", get(handlers::get_summary))
        .route("/subscriptions/calendar", get(handlers::get_calendar))
        .route(
            "/subscriptions/:id",
            get(handlers::get_subscription)
                .put(handlers::update_subscription)
                .delete(handlers::delete_subscription),
        )
        .route("/subscriptions/:id/toggle", post(handlers::toggle_subscription))
        .route("/subscriptions/:id/record", post(handlers::record_subscription))
        .route("/subscriptions/:id/skip", post(handlers::skip_subscription))
        .route("/subscriptions/:id/projected", get(handlers::get_projected_entry))
        // Recurring patterns
        .route("/recurring", get(handlers::list_recurring))
        .route("/recurring/identify", post(handlers::identify_patterns))
        .route("/recurring/cleanup", post(handlers::cleanup_patterns))
        .route("/entries/:id/promote", post(handlers::promote_entry));

    let api_routes = Router::new()
        .route("/families", get(handlers::list_families))
        .nest("/families/:family_id", family_routes)
        // Catalog
        .route("/services", get(handlers::list_services))
        .route("/services/:id/icon", get(handlers::get_service_icon))
        // Jobs
        .route("/generate", post(handlers::run_generation));

    // Restrictive default: only allow same-origin
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    if !origins.is_empty() {
        cors = cors.allow_origin(origins);
    }

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                )),
        )
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    config: ServerConfig,
    cadence: CadenceConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("Authentication disabled - do not expose to network!");
    } else if config.api_keys.is_empty() {
        warn!("No API keys configured ({}); every request will be rejected", API_KEYS_ENV);
    }

    // Start generation scheduler if configured
    if let Some(schedule) = GenerationScheduleConfig::from_env() {
        start_generation_scheduler(db.clone(), schedule);
    }

    let app = create_router(db, config, cadence);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();

        // User-facing core errors keep their message
        let status = match err.downcast_ref::<cadence_core::Error>() {
            Some(cadence_core::Error::Validation(_)) => Some(StatusCode::BAD_REQUEST),
            Some(cadence_core::Error::NotFound(_)) => Some(StatusCode::NOT_FOUND),
            Some(cadence_core::Error::InvalidTransition { .. }) => Some(StatusCode::CONFLICT),
            _ => None,
        };

        match status {
            Some(status) => Self {
                status,
                message: err.to_string(),
                internal: None,
            },
            None => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                // Return generic message to client
                message: "An internal error occurred".to_string(),
                // Keep full error for logging
                internal: Some(err),
            },
        }
    }
}
