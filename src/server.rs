use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

use crate::models::{AnalyzeFoodRequest, AnalyzeFoodResponse};
use crate::services::{AnalysisError, FoodAnalyzer};

/// Room for a 20 MiB data URI plus the JSON around it.
pub const MAX_REQUEST_BODY_BYTES: usize = 25 * 1024 * 1024;

pub struct AppState {
    pub analyzer: Arc<FoodAnalyzer>,
}

pub fn create_router(analyzer: Arc<FoodAnalyzer>) -> Router {
    let state = Arc::new(AppState { analyzer });

    Router::new()
        .route("/", get(root_handler))
        .route("/api/analyze-food", post(analyze_food_handler))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}

async fn analyze_food_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    log::info!("🔔 Analysis request received ({} bytes)", body.len());

    // Bodies that aren't UTF-8 must still get the JSON error shape.
    let request: AnalyzeFoodRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            log::error!("❌ Failed to parse analysis request: {}", e);
            return error_response(&AnalysisError::Unknown(e.to_string()));
        }
    };

    match state.analyzer.analyze(&request).await {
        Ok(result) => {
            log::info!("✅ Analysis request processed successfully");
            (StatusCode::OK, Json(AnalyzeFoodResponse::success(result))).into_response()
        }
        Err(e) => {
            log::warn!("⚠️ Analysis request failed ({}): {}", e.status_code(), e);
            error_response(&e)
        }
    }
}

fn error_response(error: &AnalysisError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(error.to_response())).into_response()
}

async fn root_handler() -> &'static str {
    "Instant Health Tracker - POST a photo data URI to /api/analyze-food"
}

async fn health_check() -> &'static str {
    "OK"
}
