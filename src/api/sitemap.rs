//! Sitemap and robots endpoints
//!
//! - GET /sitemap.xml - Cached sitemap with ETag revalidation
//! - GET /robots.txt - Crawler directives
//! - POST /api/sitemap/regenerate - Drop the cached sitemap (admin)

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::api::common::SuccessResponse;
use crate::api::middleware::{etag_matches, ApiError, AppState, AuthenticatedUser};

const SITEMAP_CACHE_CONTROL: &str = "public, max-age=3600";

/// Root-level crawler routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/sitemap.xml", get(sitemap_xml))
        .route("/robots.txt", get(robots_txt))
}

/// Routes nested under /api/sitemap
pub fn router() -> Router<AppState> {
    Router::new().route("/regenerate", post(regenerate))
}

async fn sitemap_xml(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let document = state.sitemap_service.sitemap().await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(SITEMAP_CACHE_CONTROL));
    if let Ok(etag) = HeaderValue::from_str(&document.etag) {
        response_headers.insert(header::ETAG, etag);
    }

    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|h| h.to_str().ok());
    if etag_matches(if_none_match, &document.etag) {
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/xml"));
    Ok((response_headers, document.xml).into_response())
}

async fn robots_txt(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.sitemap_service.robots().await,
    )
}

async fn regenerate(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<SuccessResponse>, ApiError> {
    user.require_admin()?;
    state.sitemap_service.regenerate().await;
    Ok(Json(SuccessResponse::ok()))
}
