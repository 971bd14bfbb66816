//! HTTP server implementation using Axum.

use axum::{
    Json, Router,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use pubscout_core::config::GatewayConfig;
use pubscout_core::traits::{DispatchQueue, PublicationStore};
use pubscout_scheduler::RetryPolicy;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub gateway_config: GatewayConfig,
    pub store: Arc<dyn PublicationStore>,
    pub queue: Arc<dyn DispatchQueue>,
    pub retry: RetryPolicy,
}

impl AppState {
    pub fn new(
        gateway_config: GatewayConfig,
        store: Arc<dyn PublicationStore>,
        queue: Arc<dyn DispatchQueue>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gateway_config,
            store,
            queue,
            retry,
        }
    }
}

/// Compare digests so the time taken does not depend on where the tokens differ.
fn token_matches(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Bearer token check for `/api/*`. No configured key means no access.
async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let expected = state.gateway_config.api_key.as_str();
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if !expected.is_empty() && token_matches(token, expected) => next.run(req).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Unauthorized"})),
        )
            .into_response(),
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    // Protected routes: bearer token
    let protected = Router::new()
        .route("/api/scout/run", post(super::routes::run_publication))
        .route("/api/scout/run-all", post(super::routes::run_all))
        .route_layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_api_key,
        ));

    // Public routes: no auth
    let public = Router::new().route("/health", get(super::routes::health_check));

    protected
        .merge(public)
        .layer(
            CorsLayer::new()
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers(Any)
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server.
pub async fn start(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.gateway_config.host, state.gateway_config.port);
    if state.gateway_config.api_key.is_empty() {
        tracing::warn!("[gateway] no api_key configured, every /api call will be rejected");
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("[gateway] listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
