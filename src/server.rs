//! Axum router construction.
//!
//! The [`app`] function wires the upload endpoint, the health probe and
//! the observability endpoints, and returns a ready-to-serve
//! [`axum::Router`].

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::debug;
use utoipa::OpenApi;

use crate::auth;
use crate::errors::UploadError;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the distfiles upload API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "distfiles",
        version = "0.1.0",
        description = "Checksum-verified upload service for versioned distribution files"
    ),
    paths(health_check, crate::handlers::upload::upload),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Upload", description = "File uploads"),
    )
)]
pub struct ApiDoc;

/// Build the axum [`Router`].
pub fn app(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/", post(crate::handlers::upload::upload))
        .route("/health", get(health_check))
        .route("/openapi.json", get(openapi_json));

    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        // Layer ordering: the last layer added is the outermost.
        // auth_middleware is innermost (closest to handlers, after routing).
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(metrics_middleware)),
        )
        // Upload size limits belong to the reverse proxy.
        .layer(DefaultBodyLimit::disable())
}

// -- Common headers middleware -----------------------------------------------

/// Middleware that adds common response headers to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `distfiles`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("distfiles"));

    response
}

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

// -- Auth middleware ---------------------------------------------------------

/// Paths that bypass authentication.
const AUTH_SKIP_PATHS: &[&str] = &["/health", "/metrics", "/openapi.json"];

/// Upload token middleware.
///
/// Runs on matched routes only, so unknown paths and methods still get
/// 404/405.  Returns `NOAUTH` when no `Authorization` header is present
/// and `BADAUTH` when it carries no accepted token.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, UploadError> {
    let path = req.uri().path();
    if AUTH_SKIP_PATHS.iter().any(|skip| path == *skip) {
        return Ok(next.run(req).await);
    }

    let header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    let token = auth::authenticate(&state.tokens, header)?;
    debug!("Auth OK for token {}", token);

    Ok(next.run(req).await)
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `OK` with 200.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        "OK",
    )
}

/// `GET /openapi.json` -- The OpenAPI document.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// -- Tests --------------------------------------------------------------------
