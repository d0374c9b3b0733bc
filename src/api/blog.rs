//! Blog post API endpoints
//!
//! Public:
//! - GET /api/blog - List posts (anonymous readers only see live posts)
//! - GET /api/blog/categories - Published post counts per category
//! - GET /api/blog/tags - Most used tags
//! - GET /api/blog/{slug} - Single post
//!
//! Authenticated:
//! - POST /api/blog - Create post
//! - PUT /api/blog/{id} - Update post (owner, editor or admin)
//! - DELETE /api/blog/{id} - Delete post (editor or admin)
//! - POST /api/blog/{id}/duplicate - Copy a post as a new draft

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_limit, default_page, DataResponse, ListResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, OptionalUser};
use crate::models::{
    BlogPost, CategoryCount, CreatePostInput, Language, PostCategory, PostFilter, PostStatus,
    TagCount, UpdatePostInput,
};

/// Query parameters for listing posts
#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub status: Option<PostStatus>,
    pub category: Option<PostCategory>,
    pub language: Option<Language>,
    pub author: Option<i64>,
    pub tag: Option<String>,
    pub search: Option<String>,
}

impl ListPostsQuery {
    /// Anonymous readers are pinned to live posts whatever they ask for
    fn filter(&self, signed_in: bool) -> PostFilter {
        let base = if signed_in {
            PostFilter {
                status: self.status,
                ..Default::default()
            }
        } else {
            PostFilter::live()
        };
        PostFilter {
            category: self.category,
            language: self.language,
            author_id: self.author,
            tag: non_empty(self.tag.as_deref()),
            search: non_empty(self.search.as_deref()),
            ..base
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

/// Build the blog router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts).post(create_post))
        .route("/categories", get(list_categories))
        .route("/tags", get(list_tags))
        .route("/{slug}", get(get_post).put(update_post).delete(delete_post))
        .route("/{slug}/duplicate", post(duplicate_post))
}

/// GET /api/blog
async fn list_posts(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<ListResponse<BlogPost>>, ApiError> {
    let filter = query.filter(user.is_some());
    let params = PaginationQuery {
        page: query.page,
        limit: query.limit,
    }
    .params();

    let result = state.post_service.list(&filter, &params).await?;
    Ok(Json(result.into()))
}

/// GET /api/blog/categories
async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<CategoryCount>>>, ApiError> {
    let categories = state.post_service.categories().await?;
    Ok(Json(DataResponse::new(categories)))
}

/// GET /api/blog/tags
async fn list_tags(State(state): State<AppState>) -> Result<Json<DataResponse<Vec<TagCount>>>, ApiError> {
    let tags = state.post_service.tags().await?;
    Ok(Json(DataResponse::new(tags)))
}

/// GET /api/blog/{slug}
///
/// Unpublished posts are visible to signed-in users only.
async fn get_post(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Path(slug): Path<String>,
) -> Result<Json<DataResponse<BlogPost>>, ApiError> {
    let post = state
        .post_service
        .get_by_slug(&slug, user.is_some())
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;
    Ok(Json(DataResponse::new(post)))
}

/// POST /api/blog
async fn create_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.post_service.create(body, &user.0).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(post))))
}

/// PUT /api/blog/{id}
async fn update_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePostInput>,
) -> Result<Json<DataResponse<BlogPost>>, ApiError> {
    let post = state.post_service.update(id, body, &user.0).await?;
    Ok(Json(DataResponse::new(post)))
}

/// DELETE /api/blog/{id}
async fn delete_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.post_service.delete(id, &user.0).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/blog/{id}/duplicate
async fn duplicate_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.post_service.duplicate(id, &user.0).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(post))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(status: Option<PostStatus>) -> ListPostsQuery {
        ListPostsQuery {
            page: 1,
            limit: 10,
            status,
            category: Some(PostCategory::Insights),
            language: None,
            author: None,
            tag: Some("  ".to_string()),
            search: Some(" tax ".to_string()),
        }
    }

    #[test]
    fn test_anonymous_filter_is_live_only() {
        let filter = query(Some(PostStatus::Draft)).filter(false);
        assert!(filter.live_only);
        assert_eq!(filter.status, None);
        assert_eq!(filter.category, Some(PostCategory::Insights));
        assert_eq!(filter.tag, None);
        assert_eq!(filter.search.as_deref(), Some("tax"));
    }

    #[test]
    fn test_signed_in_filter_keeps_status() {
        let filter = query(Some(PostStatus::Draft)).filter(true);
        assert!(!filter.live_only);
        assert_eq!(filter.status, Some(PostStatus::Draft));
    }
}
