use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{
    AppState,
    catalog::storage::{STATIC_URL_PREFIX, is_public_file},
    middleware::{rate_limit, security_headers},
};

pub mod error;
mod health;
mod images;

use error::ErrorResponse;

/// The full HTTP surface: JSON API under `/api`, stored images under `/uploads`,
/// and a JSON 404 for everything else.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(images::router(&state))
        .merge(health::router())
        .layer(middleware::from_fn_with_state(
            state.api_limiter().clone(),
            rate_limit::enforce,
        ));

    let uploads = Router::new()
        .fallback_service(ServeDir::new(state.catalog().layout().root()))
        .layer(middleware::from_fn(only_public_files));

    Router::new()
        .nest("/api", api)
        .nest(STATIC_URL_PREFIX, uploads)
        .fallback(route_not_found)
        .layer(middleware::from_fn(security_headers::add_security_headers))
        .layer(cors_layer(&state.config().cors_origins))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// The storage directory also holds sidecars and temp files; only images leave it.
async fn only_public_files(request: Request, next: Next) -> Response {
    let filename = request.uri().path().rsplit('/').next().unwrap_or_default();
    if !is_public_file(filename) {
        return route_not_found().await.into_response();
    }
    next.run(request).await
}

async fn route_not_found() -> ErrorResponse {
    ErrorResponse::new(StatusCode::NOT_FOUND, "Route not found")
}
