//! SEO API endpoints
//!
//! - GET /api/seo/settings - Public subset, or the full document when signed in
//! - PUT /api/seo/settings - Replace the settings document (admin)
//! - GET /api/seo/analyze/{type}/{id} - Analyze one post or page
//! - GET /api/seo/audit - Audit all published content (admin)
//! - GET|POST /api/seo/redirects - List or add redirects (admin)
//! - DELETE /api/seo/redirects/{index} - Remove by position (admin)
//! - DELETE /api/seo/redirects/id/{id} - Remove by stable id (admin)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use uuid::Uuid;

use crate::api::common::DataResponse;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, OptionalUser};
use crate::models::{ContentKind, CreateRedirectInput, Redirect, SiteSettings};
use crate::services::{SeoAnalysis, SiteAudit};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/settings", get(get_settings).put(update_settings))
        .route("/analyze/{kind}/{id}", get(analyze_content))
        .route("/audit", get(audit_site))
        .route("/redirects", get(list_redirects).post(add_redirect))
        .route("/redirects/{index}", delete(remove_redirect_at))
        .route("/redirects/id/{id}", delete(remove_redirect))
}

async fn get_settings(State(state): State<AppState>, OptionalUser(user): OptionalUser) -> Response {
    let settings = state.settings_service.get().await;
    match user {
        Some(_) => Json(DataResponse::new(settings)).into_response(),
        None => Json(DataResponse::new(settings.public_view())).into_response(),
    }
}

async fn update_settings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(settings): Json<SiteSettings>,
) -> Result<Json<DataResponse<SiteSettings>>, ApiError> {
    user.require_admin()?;
    let settings = state.settings_service.replace(settings, Some(user.0.id)).await?;
    Ok(Json(DataResponse::new(settings)))
}

async fn analyze_content(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<DataResponse<SeoAnalysis>>, ApiError> {
    let kind: ContentKind = kind
        .parse()
        .map_err(|_| ApiError::validation_error("Content type must be 'blog' or 'page'"))?;
    let analysis = state.seo_service.analyze(kind, id).await?;
    Ok(Json(DataResponse::new(analysis)))
}

async fn audit_site(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<DataResponse<SiteAudit>>, ApiError> {
    user.require_admin()?;
    let audit = state.seo_service.audit().await?;
    Ok(Json(DataResponse::new(audit)))
}

async fn list_redirects(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<DataResponse<Vec<Redirect>>>, ApiError> {
    user.require_admin()?;
    Ok(Json(DataResponse::new(state.settings_service.redirects().await)))
}

async fn add_redirect(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreateRedirectInput>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_admin()?;
    let redirects = state.settings_service.add_redirect(input, Some(user.0.id)).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(redirects))))
}

async fn remove_redirect_at(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(index): Path<usize>,
) -> Result<Json<DataResponse<Vec<Redirect>>>, ApiError> {
    user.require_admin()?;
    let redirects = state
        .settings_service
        .remove_redirect_at(index, Some(user.0.id))
        .await?;
    Ok(Json(DataResponse::new(redirects)))
}

async fn remove_redirect(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DataResponse<Vec<Redirect>>>, ApiError> {
    user.require_admin()?;
    let redirects = state.settings_service.remove_redirect(id, Some(user.0.id)).await?;
    Ok(Json(DataResponse::new(redirects)))
}
