//! Cadence Web Server
//!
//! Axum-based REST API for the Cadence recurring-spend detection service.
//!
//! Features:
//! - Merchant, transaction, rule, and pattern endpoints
//! - CSV batch upload with full normalize + detect pipeline
//! - Restrictive CORS policy and security headers
//! - Request tracing and sanitized error responses
//! - Hourly analysis-cache expiry sweep

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use cadence_core::db::Database;
use cadence_core::events::BroadcastSink;
use cadence_core::oracle::{OracleBackend, OracleClient};

mod handlers;

/// Maximum file upload size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Interval between analysis-cache expiry sweeps
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Server configuration
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub oracle: Option<OracleClient>,
    /// Fire-and-forget event fan-out for downstream consumers
    pub events: BroadcastSink,
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(db: Database, config: ServerConfig) -> Router {
    // Create oracle client if configured
    let oracle = OracleClient::from_env();
    if let Some(ref client) = oracle {
        info!(
            "Oracle configured: {} (model: {})",
            client.host(),
            client.model()
        );
    } else {
        info!("Oracle not configured (set ORACLE_HOST to enable classification)");
    }

    create_router_with_oracle(db, config, oracle)
}

/// Create the application router with an explicit oracle (for testing)
pub fn create_router_with_oracle(
    db: Database,
    config: ServerConfig,
    oracle: Option<OracleClient>,
) -> Router {
    let (events, _rx) = BroadcastSink::new(256);

    let state = Arc::new(AppState { db, oracle, events });

    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Merchants
        .route(
            "/merchants",
            get(handlers::search_merchants).post(handlers::create_merchant),
        )
        .route("/merchants/:id", get(handlers::get_merchant))
        .route(
            "/merchants/:id/deactivate",
            post(handlers::deactivate_merchant),
        )
        .route("/merchants/normalize", post(handlers::normalize_merchant))
        // Transactions
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route("/transactions/:id", get(handlers::get_transaction))
        .route("/transactions/upload", post(handlers::upload_transactions))
        .route("/transactions/analyze", post(handlers::analyze_transactions))
        // Patterns
        .route("/patterns", get(handlers::list_patterns))
        .route("/patterns/detect", post(handlers::detect_patterns))
        .route(
            "/patterns/merchant/:id",
            get(handlers::get_patterns_by_merchant),
        )
        // Rules
        .route(
            "/rules",
            get(handlers::list_rules).post(handlers::create_rule),
        )
        .route("/rules/:id", delete(handlers::delete_rule))
        .route("/rules/test", post(handlers::test_rules))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_UPLOAD_SIZE));

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server
pub async fn serve(db: Database, host: &str, port: u16, config: ServerConfig) -> anyhow::Result<()> {
    // Check oracle connectivity up front so misconfiguration is visible at startup
    check_oracle_connection().await;

    // Periodic analysis-cache expiry sweep
    start_cache_sweeper(db.clone());

    let app = create_router(db, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawn the hourly cache-expiry sweep task
fn start_cache_sweeper(db: Database) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_SWEEP_INTERVAL);
        // The first tick fires immediately; skip it so startup stays quick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match db.cache_cleanup_expired() {
                Ok(removed) if removed > 0 => {
                    info!(removed, "Analysis cache sweep complete");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Analysis cache sweep failed"),
            }
        }
    });
}

/// Check and log oracle connection status
async fn check_oracle_connection() {
    match OracleClient::from_env() {
        Some(client) => {
            if client.health_check().await {
                info!(
                    "Oracle connected: {} (model: {})",
                    client.host(),
                    client.model()
                );
            } else {
                warn!(
                    "Oracle configured but not responding: {} (model: {})",
                    client.host(),
                    client.model()
                );
            }
        }
        None => {
            info!("Oracle not configured (set ORACLE_HOST to enable classification)");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
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

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unavailable(msg: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
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

impl From<cadence_core::Error> for AppError {
    fn from(err: cadence_core::Error) -> Self {
        use cadence_core::Error;

        match err {
            Error::Validation(msg) => Self::bad_request(&msg),
            Error::NotFound(msg) => Self::not_found(&msg),
            Error::Rule(msg) => Self::bad_request(&msg),
            Error::InvalidData(msg) => Self::conflict(&msg),
            Error::Oracle(msg) => Self::unavailable(&msg),
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                // Return generic message to client
                message: "An internal error occurred".to_string(),
                // Keep full error for logging
                internal: Some(other.into()),
            },
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred".to_string(),
            internal: Some(err),
        }
    }
}
