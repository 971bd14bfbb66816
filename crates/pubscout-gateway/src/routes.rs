//! Manual trigger handlers. Neither touches `next_scout_at`.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use pubscout_core::error::ScoutError;
use pubscout_scheduler::scanner::{enqueue_all, enqueue_publication};

use crate::server::AppState;

type ApiResponse = (StatusCode, Json<serde_json::Value>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiResponse {
    (status, Json(serde_json::json!({"error": message.into()})))
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pubscout",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub publication_id: Option<String>,
}

/// `POST /api/scout/run`: enqueue one publication now.
pub async fn run_publication(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunRequest>,
) -> ApiResponse {
    let Some(publication_id) = body.publication_id.filter(|id| !id.trim().is_empty()) else {
        return error(StatusCode::BAD_REQUEST, "publicationId is required");
    };

    match enqueue_publication(
        state.store.as_ref(),
        state.queue.as_ref(),
        &publication_id,
        &state.retry,
    )
    .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"queued": true, "publicationId": publication_id})),
        ),
        Err(ScoutError::PublicationNotFound(_)) => {
            error(StatusCode::NOT_FOUND, format!("publication {publication_id} not found"))
        }
        Err(e) => {
            tracing::error!("[gateway] run {publication_id} failed: {e}");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// `POST /api/scout/run-all`: enqueue every publication now.
pub async fn run_all(State(state): State<Arc<AppState>>) -> ApiResponse {
    match enqueue_all(state.store.as_ref(), state.queue.as_ref(), &state.retry).await {
        Ok(count) => (
            StatusCode::OK,
            Json(serde_json::json!({"queued": true, "count": count})),
        ),
        Err(e) => {
            tracing::error!("[gateway] run-all failed: {e}");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
