//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error envelope and service error conversions
//! - Session authentication (Bearer token or `session` cookie)
//! - Redirect rules from the site settings

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::cache::create_cache;
use crate::config::{Config, UploadConfig};
use crate::db::repositories::{
    SqlxPageRepository, SqlxPostRepository, SqlxSessionRepository, SqlxSettingsRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    AnalyticsService, FieldViolation, FsMediaStore, MarkdownRenderer, PageService,
    PageServiceError, PostService, PostServiceError, SeoService, SeoServiceError,
    SettingsService, SettingsServiceError, SitemapService, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub post_service: Arc<PostService>,
    pub page_service: Arc<PageService>,
    pub seo_service: Arc<SeoService>,
    pub settings_service: Arc<SettingsService>,
    pub sitemap_service: Arc<SitemapService>,
    pub analytics_service: Arc<AnalyticsService>,
    pub upload_config: Arc<UploadConfig>,
}

impl AppState {
    /// Wire repositories and services over an initialized pool
    pub async fn build(pool: DynDatabasePool, config: &Config) -> anyhow::Result<Self> {
        let cache = create_cache(&config.cache);

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let post_repo = SqlxPostRepository::boxed(pool.clone());
        let page_repo = SqlxPageRepository::boxed(pool.clone());
        let settings_repo = SqlxSettingsRepository::boxed(pool.clone());

        let settings_service = Arc::new(SettingsService::load(settings_repo, cache.clone()).await?);
        let user_service = Arc::new(UserService::new(user_repo, session_repo));
        let media = FsMediaStore::from_config(&config.upload);
        let post_service = Arc::new(PostService::new(
            post_repo.clone(),
            page_repo.clone(),
            cache.clone(),
            MarkdownRenderer::new(),
            media.clone(),
        ));
        let page_service = Arc::new(PageService::new(
            page_repo.clone(),
            post_repo.clone(),
            cache.clone(),
            media,
        ));
        let seo_service = Arc::new(SeoService::new(
            post_repo.clone(),
            page_repo.clone(),
            settings_service.clone(),
        ));
        let sitemap_service = Arc::new(SitemapService::new(
            post_repo.clone(),
            page_repo.clone(),
            settings_service.clone(),
            cache,
            Duration::from_secs(config.cache.sitemap_ttl_seconds),
        ));
        let analytics_service = Arc::new(AnalyticsService::new(post_repo, page_repo));

        Ok(Self {
            pool,
            user_service,
            post_service,
            page_service,
            seo_service,
            settings_service,
            sitemap_service,
            analytics_service,
            upload_config: Arc::new(config.upload.clone()),
        })
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    /// Log the cause and answer with a message that leaks nothing
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        error!("Internal error: {:#}", cause);
        Self::new("INTERNAL_ERROR", "An internal error occurred")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" | "DUPLICATE_SLUG" | "DUPLICATE_REDIRECT" | "HAS_CHILDREN" => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<FieldViolation> for ApiError {
    fn from(violation: FieldViolation) -> Self {
        ApiError::with_details(
            "VALIDATION_ERROR",
            violation.message,
            json!({ "field": violation.field }),
        )
    }
}

impl From<PostServiceError> for ApiError {
    fn from(err: PostServiceError) -> Self {
        match err {
            PostServiceError::NotFound => ApiError::not_found("Post not found"),
            PostServiceError::Validation(v) => v.into(),
            PostServiceError::DuplicateSlug(_) => {
                ApiError::new("DUPLICATE_SLUG", "A post with this slug already exists")
            }
            PostServiceError::Forbidden => ApiError::forbidden("Not authorized to modify this post"),
            PostServiceError::Internal(e) => ApiError::internal(e),
        }
    }
}

impl From<PageServiceError> for ApiError {
    fn from(err: PageServiceError) -> Self {
        match err {
            PageServiceError::NotFound => ApiError::not_found("Page not found"),
            PageServiceError::Validation(v) => v.into(),
            PageServiceError::DuplicateSlug(_) => {
                ApiError::new("DUPLICATE_SLUG", "A page with this slug already exists")
            }
            e @ PageServiceError::HasChildren => ApiError::new("HAS_CHILDREN", e.to_string()),
            PageServiceError::Internal(e) => ApiError::internal(e),
        }
    }
}

impl From<SettingsServiceError> for ApiError {
    fn from(err: SettingsServiceError) -> Self {
        match err {
            SettingsServiceError::Validation(v) => v.into(),
            e @ SettingsServiceError::DuplicateRedirect(_) => {
                ApiError::new("DUPLICATE_REDIRECT", e.to_string())
            }
            SettingsServiceError::RedirectNotFound => ApiError::not_found("Redirect not found"),
            SettingsServiceError::Internal(e) => ApiError::internal(e),
        }
    }
}

impl From<SeoServiceError> for ApiError {
    fn from(err: SeoServiceError) -> Self {
        match err {
            SeoServiceError::NotFound => ApiError::not_found("Content not found"),
            SeoServiceError::Internal(e) => ApiError::internal(e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::validation_error(msg),
            UserServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(err)
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.0.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin privileges required"))
        }
    }

    pub fn require_editor(&self) -> Result<(), ApiError> {
        if self.0.is_editor() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Editor privileges required"))
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Caller that may or may not be signed in
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<User>);

impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalUser(
            parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        ))
    }
}

/// Extract session token from request
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Attach the signed-in user, if any, to the request
///
/// Handlers that need a user take `AuthenticatedUser`, which rejects with
/// 401 when this middleware found no valid session.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => debug!("Request carried an unknown or expired session"),
            Err(e) => error!("Session validation failed: {}", e),
        }
    }
    next.run(request).await
}

/// Answer GET and HEAD requests whose path matches an active redirect
pub async fn redirect_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::GET || request.method() == Method::HEAD {
        if let Some(redirect) = state.settings_service.find_redirect(request.uri().path()).await {
            let status = StatusCode::from_u16(redirect.status_code.as_u16())
                .unwrap_or(StatusCode::MOVED_PERMANENTLY);
            debug!(
                source = %redirect.source,
                destination = %redirect.destination,
                "Redirect applied"
            );
            return (status, [(header::LOCATION, redirect.destination)]).into_response();
        }
    }
    next.run(request).await
}

/// Check if ETags match
pub fn etag_matches(request_etag: Option<&str>, response_etag: &str) -> bool {
    match request_etag {
        Some(etag) => etag.split(',').any(|candidate| {
            let candidate = candidate.trim();
            candidate == "*" || candidate.trim_start_matches("W/") == response_etag.trim_start_matches("W/")
        }),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_matches() {
        assert!(etag_matches(Some("\"abc\""), "\"abc\""));
        assert!(etag_matches(Some("W/\"abc\""), "\"abc\""));
        assert!(etag_matches(Some("\"x\", \"abc\""), "\"abc\""));
        assert!(etag_matches(Some("*"), "\"abc\""));
        assert!(!etag_matches(Some("\"def\""), "\"abc\""));
        assert!(!etag_matches(None, "\"abc\""));
    }

    #[test]
    fn test_extract_session_token() {
        let request = axum::http::Request::builder()
            .header(header::AUTHORIZATION, "Bearer tok123")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_session_token(request.headers()), Some("tok123".to_string()));

        let request = axum::http::Request::builder()
            .header(header::COOKIE, "theme=dark; session=abc")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_session_token(request.headers()), Some("abc".to_string()));

        let request = axum::http::Request::builder()
            .header(header::COOKIE, "session=")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_session_token(request.headers()), None);
    }

    #[test]
    fn test_field_violation_maps_to_validation_error() {
        let err: ApiError = FieldViolation::new("title", "Title is required").into();
        assert_eq!(err.error.code, "VALIDATION_ERROR");
        assert_eq!(err.error.details, Some(json!({ "field": "title" })));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_domain_errors_are_bad_requests() {
        let err: ApiError = PageServiceError::HasChildren.into();
        assert_eq!(err.error.code, "HAS_CHILDREN");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err: ApiError = SettingsServiceError::DuplicateRedirect("/old".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_error_hides_cause() {
        let err: ApiError = PostServiceError::Internal(anyhow::anyhow!("disk on fire")).into();
        assert_eq!(err.error.code, "INTERNAL_ERROR");
        assert!(!err.error.message.contains("disk"));
    }
}
