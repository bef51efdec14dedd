use api_types::{DiagnosticResponse, HealthResponse};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header},
    routing::get,
};
use chrono::Utc;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/test", get(diagnostic))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = state.config();
    Json(HealthResponse {
        status: "OK".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: config.environment.as_str().to_string(),
        cors_origins: config.cors_origins.clone(),
    })
}

async fn diagnostic(headers: HeaderMap) -> Json<DiagnosticResponse> {
    let header_text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    Json(DiagnosticResponse {
        message: "Backend is working!".to_string(),
        origin: header_text(header::ORIGIN),
        host: header_text(header::HOST),
        timestamp: Utc::now(),
    })
}
