//! Pages API endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{DataResponse, SuccessResponse};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, OptionalUser};
use crate::models::{
    CreatePageInput, Language, NavNode, Page, PageFilter, PageOrderItem, PageStatus, PageTemplate,
    UpdatePageInput,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pages).post(create_page))
        .route("/navigation", get(navigation))
        .route("/reorder", put(reorder_pages))
        .route("/{slug}", get(get_page).put(update_page).delete(delete_page))
}

#[derive(Debug, Deserialize)]
pub struct ListPagesQuery {
    pub status: Option<PageStatus>,
    pub template: Option<PageTemplate>,
    pub language: Option<Language>,
    /// A page id, or `root` for top-level pages
    pub parent: Option<String>,
}

impl ListPagesQuery {
    fn filter(&self, signed_in: bool) -> Result<PageFilter, ApiError> {
        let parent_id = match self.parent.as_deref().map(str::trim) {
            None | Some("") => None,
            Some("root") | Some("null") => Some(None),
            Some(raw) => Some(Some(raw.parse::<i64>().map_err(|_| {
                ApiError::validation_error("parent must be a page id or 'root'")
            })?)),
        };
        let status = if signed_in {
            self.status
        } else {
            Some(PageStatus::Published)
        };
        Ok(PageFilter {
            status,
            template: self.template,
            language: self.language,
            parent_id,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct NavigationQuery {
    #[serde(default)]
    pub language: Language,
}

async fn list_pages(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Query(query): Query<ListPagesQuery>,
) -> Result<Json<DataResponse<Vec<Page>>>, ApiError> {
    let filter = query.filter(user.is_some())?;
    let pages = state.page_service.list(&filter).await?;
    Ok(Json(DataResponse::new(pages)))
}

async fn navigation(
    State(state): State<AppState>,
    Query(query): Query<NavigationQuery>,
) -> Result<Json<DataResponse<Vec<NavNode>>>, ApiError> {
    let tree = state.page_service.navigation(query.language).await?;
    Ok(Json(DataResponse::new(tree)))
}

async fn get_page(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Path(slug): Path<String>,
) -> Result<Json<DataResponse<Page>>, ApiError> {
    let page = state
        .page_service
        .get_by_slug(&slug, user.is_some())
        .await?
        .ok_or_else(|| ApiError::not_found("Page not found"))?;
    Ok(Json(DataResponse::new(page)))
}

async fn create_page(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreatePageInput>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_editor()?;
    let page = state.page_service.create(input, &user.0).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(page))))
}

async fn update_page(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePageInput>,
) -> Result<Json<DataResponse<Page>>, ApiError> {
    user.require_editor()?;
    let page = state.page_service.update(id, input, &user.0).await?;
    Ok(Json(DataResponse::new(page)))
}

async fn delete_page(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    user.require_admin()?;
    state.page_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub pages: Vec<PageOrderItem>,
}

async fn reorder_pages(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ReorderRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    user.require_editor()?;
    state.page_service.reorder(&body.pages).await?;
    Ok(Json(SuccessResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(parent: Option<&str>) -> ListPagesQuery {
        ListPagesQuery {
            status: Some(PageStatus::Draft),
            template: None,
            language: None,
            parent: parent.map(String::from),
        }
    }

    #[test]
    fn test_parent_filter_parsing() {
        assert_eq!(query(None).filter(true).unwrap().parent_id, None);
        assert_eq!(query(Some("root")).filter(true).unwrap().parent_id, Some(None));
        assert_eq!(query(Some("7")).filter(true).unwrap().parent_id, Some(Some(7)));
        assert!(query(Some("seven")).filter(true).is_err());
    }

    #[test]
    fn test_anonymous_sees_published_only() {
        assert_eq!(query(None).filter(false).unwrap().status, Some(PageStatus::Published));
        assert_eq!(query(None).filter(true).unwrap().status, Some(PageStatus::Draft));
    }
}
