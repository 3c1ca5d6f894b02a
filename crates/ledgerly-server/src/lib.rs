//! Ledgerly Web Server
//!
//! Axum-based REST API for the Ledgerly expense manager.
//!
//! Security features:
//! - Bearer API key authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Input validation (pagination limits, body size limits)
//! - Full audit logging for all API access (reads and writes)
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use ledgerly_core::{AppConfig, Database};

mod handlers;

/// Maximum request body size (5 MB); covers CSV/JSON imports and OCR text
pub const MAX_BODY_SIZE: usize = 5 * 1024 * 1024;

/// Environment variable holding comma-separated API keys
pub const API_KEYS_ENV: &str = "LEDGERLY_API_KEYS";

/// Header carrying the caller's identity for audit logging
const USER_EMAIL_HEADER: &str = "x-user-email";

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// API keys accepted as `Authorization: Bearer <key>`
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

impl ServerConfig {
    /// Read API keys from `LEDGERLY_API_KEYS`
    pub fn with_env_api_keys(mut self) -> Self {
        if let Ok(keys) = std::env::var(API_KEYS_ENV) {
            self.api_keys = parse_api_keys(&keys);
        }
        self
    }
}

/// Split a comma-separated key list, dropping blanks
pub fn parse_api_keys(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub app_config: AppConfig,
}

impl AppState {
    /// Organization for a request, falling back to the configured default
    pub fn organization_id(&self, requested: Option<i64>) -> i64 {
        requested.unwrap_or(self.app_config.default_organization_id)
    }
}

/// Authentication middleware - validates bearer API keys
///
/// API keys are compared in constant time. With `require_auth` off every
/// request passes; that mode is meant for local development only.
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
        tracing::debug!(path = %request.uri().path(), "Authenticated via API key");
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time comparison
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();
    valid_keys.iter().any(|key| {
        let key_bytes = key.as_bytes();
        // ct_eq is only constant-time for equal lengths
        provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes))
    })
}

/// Extract the caller identity from request headers (for audit logging)
///
/// Returns the `X-User-Email` value, "api-key" for API key auth, or
/// "local-dev" for unauthenticated requests.
pub fn get_user_email(headers: &axum::http::HeaderMap) -> String {
    if let Some(email) = headers
        .get(USER_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return email.to_string();
    }

    if headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .is_some()
    {
        return "api-key".to_string();
    }

    "local-dev".to_string()
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(db: Database, config: ServerConfig, app_config: AppConfig) -> Router {
    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        app_config,
    });

    let api_routes = Router::new()
        // Per-diem
        .route(
            "/per-diem/rates",
            get(handlers::list_rates).post(handlers::upsert_rate),
        )
        .route(
            "/per-diem/rates/:id",
            axum::routing::delete(handlers::delete_rate),
        )
        .route("/per-diem/lookup", get(handlers::lookup_rate))
        .route("/per-diem/calculate", post(handlers::calculate_per_diem))
        // Trips
        .route(
            "/trips",
            get(handlers::list_trips).post(handlers::create_trip),
        )
        .route("/trips/:id", get(handlers::get_trip))
        .route("/trips/:id/status", post(handlers::update_trip_status))
        .route(
            "/trips/:id/days/:date",
            axum::routing::patch(handlers::update_trip_day),
        )
        // Transaction rules
        .route(
            "/rules",
            get(handlers::list_rules).post(handlers::create_rule),
        )
        .route("/rules/test", post(handlers::test_rules))
        .route(
            "/rules/:id",
            get(handlers::get_rule)
                .patch(handlers::update_rule)
                .delete(handlers::delete_rule),
        )
        // Imported transactions
        .route("/transactions", get(handlers::list_transactions))
        .route("/transactions/import", post(handlers::import_transactions))
        .route("/transactions/apply-rules", post(handlers::apply_rules))
        .route(
            "/transactions/:id/ignore",
            post(handlers::ignore_transaction),
        )
        .route(
            "/transactions/:id/reclassify",
            post(handlers::reclassify_transaction),
        )
        .route(
            "/transactions/:id/convert",
            post(handlers::convert_transaction),
        )
        // Receipts
        .route(
            "/receipts",
            get(handlers::list_receipts).post(handlers::create_receipt),
        )
        .route("/receipts/extract", post(handlers::extract_receipt))
        .route("/receipts/:id", get(handlers::get_receipt))
        .route("/receipts/:id/attach", post(handlers::attach_receipt))
        // Expenses
        .route(
            "/expenses",
            get(handlers::list_expenses).post(handlers::create_expense),
        )
        .route("/expenses/:id", get(handlers::get_expense))
        // Policies
        .route(
            "/policies",
            get(handlers::list_policies).post(handlers::create_policy),
        )
        .route("/policies/effective", get(handlers::get_effective_policy))
        .route("/policies/evaluate", post(handlers::evaluate_policy))
        .route(
            "/policies/:id",
            axum::routing::delete(handlers::delete_policy),
        )
        // Audit
        .route("/audit", get(handlers::list_audit_log));

    let methods = [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
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
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        ))
}

/// Start the server
pub async fn serve(
    db: Database,
    host: &str,
    port: u16,
    config: ServerConfig,
    app_config: AppConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("Authentication disabled - do not expose to network!");
    } else if config.api_keys.is_empty() {
        warn!(
            "Authentication required but {} is empty; every request will be rejected",
            API_KEYS_ENV
        );
    }

    let app = create_router(db, config, app_config);
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

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
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
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
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

        // Caller mistakes surface as client errors with their message
        if let Some(core) = err.downcast_ref::<ledgerly_core::Error>() {
            match core {
                ledgerly_core::Error::NotFound(_) => return Self::not_found(&core.to_string()),
                ledgerly_core::Error::InvalidData(_) | ledgerly_core::Error::Import(_) => {
                    return Self::bad_request(&core.to_string())
                }
                ledgerly_core::Error::InvalidTransition { .. } => {
                    return Self::conflict(&core.to_string())
                }
                _ => {}
            }
        }

        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
