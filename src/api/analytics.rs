//! Analytics API endpoints
//!
//! - GET /api/analytics/dashboard - Content counts and top posts
//! - GET /api/analytics/content?period=7d|30d|90d - Publishing activity
//! - GET /api/analytics/seo-health - SEO field coverage (admin)
//! - POST /api/analytics/track-view - Count a public view

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::debug;

use crate::api::common::{DataResponse, SuccessResponse};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::ContentKind;
use crate::services::analytics::{ContentReport, Dashboard, SeoHealth};
use crate::services::Period;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/content", get(content))
        .route("/seo-health", get(seo_health))
        .route("/track-view", post(track_view))
}

#[derive(Debug, Deserialize)]
pub struct ContentQuery {
    #[serde(default)]
    pub period: Period,
}

/// Body of a view beacon; malformed bodies are tolerated
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TrackViewRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub slug: Option<String>,
}

async fn dashboard(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<Json<DataResponse<Dashboard>>, ApiError> {
    let dashboard = state.analytics_service.dashboard().await?;
    Ok(Json(DataResponse::new(dashboard)))
}

async fn content(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<ContentQuery>,
) -> Result<Json<DataResponse<ContentReport>>, ApiError> {
    let report = state.analytics_service.content(query.period).await?;
    Ok(Json(DataResponse::new(report)))
}

async fn seo_health(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<DataResponse<SeoHealth>>, ApiError> {
    user.require_admin()?;
    let health = state.analytics_service.seo_health().await?;
    Ok(Json(DataResponse::new(health)))
}

/// POST /api/analytics/track-view
///
/// Always answers success; tracking problems stay in the logs.
async fn track_view(
    State(state): State<AppState>,
    body: Result<Json<TrackViewRequest>, JsonRejection>,
) -> Json<SuccessResponse> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    match (
        request.kind.as_deref().map(str::parse::<ContentKind>),
        request.slug.as_deref(),
    ) {
        (Some(Ok(kind)), Some(slug)) if !slug.is_empty() => {
            state.analytics_service.track_view(kind, slug).await;
        }
        _ => debug!("Ignoring malformed track-view request"),
    }
    Json(SuccessResponse::ok())
}
