//! API layer - HTTP handlers and routing
//!
//! - Auth endpoints (`/api/auth`)
//! - Blog post endpoints (`/api/blog`)
//! - Page endpoints (`/api/pages`)
//! - SEO settings, analysis, audit and redirects (`/api/seo`)
//! - Sitemap regeneration (`/api/sitemap`), `/sitemap.xml` and `/robots.txt`
//! - Analytics (`/api/analytics`)
//! - Uploaded media under the configured public prefix

pub mod analytics;
pub mod auth;
pub mod blog;
pub mod common;
pub mod middleware;
pub mod pages;
pub mod seo;
pub mod sitemap;


use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};
use tracing::warn;

pub use middleware::{etag_matches, ApiError, AppState, AuthenticatedUser, OptionalUser};

/// Build the `/api` router
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router())
        .nest("/blog", blog::router())
        .nest("/pages", pages::router())
        .nest("/seo", seo::router())
        .nest("/sitemap", sitemap::router())
        .nest("/analytics", analytics::router())
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);
    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(e) => warn!(cors_origin, "Ignoring invalid CORS origin: {}", e),
    }

    let mut router = Router::new()
        .nest("/api", build_api_router())
        .merge(sitemap::public_router());

    let prefix = state.upload_config.public_prefix.trim_end_matches('/');
    if prefix.starts_with('/') && prefix.len() > 1 {
        router = router.nest_service(prefix, ServeDir::new(&state.upload_config.path));
    }

    router
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::redirect_middleware,
        ))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.pool.ping().await?;
    Ok(Json(json!({ "status": "ok" })))
}
