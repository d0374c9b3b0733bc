//! Page service
//!
//! Pages form a tree. Every parent change is checked so the tree stays
//! acyclic, and a page that still has children cannot be deleted.

use crate::cache::Cache;
use crate::db::is_unique_violation;
use crate::db::repositories::{PageRepository, PostRepository};
use crate::models::{
    ContentBlock, CreatePageInput, Language, NavNode, Page, PageFilter, PageOrderItem,
    PageStatus, UpdatePageInput, User,
};
use crate::services::media::{remove_unreferenced, MediaStore};
use crate::services::sitemap::invalidate_sitemap;
use crate::services::validation::{
    resolve_slug, validate_seo, validate_slug, validate_title, FieldViolation,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PageServiceError {
    #[error("Page not found")]
    NotFound,

    #[error("{0}")]
    Validation(FieldViolation),

    #[error("Page slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Cannot delete page with children. Delete or reassign children first.")]
    HasChildren,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<FieldViolation> for PageServiceError {
    fn from(violation: FieldViolation) -> Self {
        PageServiceError::Validation(violation)
    }
}

/// Block content keys whose string values point at media files
const MEDIA_KEYS: &[&str] = &["url", "src", "image", "images", "background_image"];

pub struct PageService {
    repo: Arc<dyn PageRepository>,
    post_repo: Arc<dyn PostRepository>,
    cache: Arc<Cache>,
    media: Arc<dyn MediaStore>,
}

impl PageService {
    pub fn new(
        repo: Arc<dyn PageRepository>,
        post_repo: Arc<dyn PostRepository>,
        cache: Arc<Cache>,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            repo,
            post_repo,
            cache,
            media,
        }
    }

    pub async fn create(&self, input: CreatePageInput, user: &User) -> Result<Page, PageServiceError> {
        let title = validate_title(&input.title)?;
        let seo = input.seo.unwrap_or_default();
        validate_seo(&seo)?;

        let slug = resolve_slug(input.slug.as_deref(), &title)?;
        if self.repo.slug_exists(&slug, None).await? {
            return Err(PageServiceError::DuplicateSlug(slug));
        }
        if let Some(parent_id) = input.parent_id {
            self.require_parent(parent_id).await?;
        }

        let now = Utc::now();
        let status = input.status.unwrap_or_default();
        let page = Page {
            id: 0,
            title,
            slug,
            template: input.template.unwrap_or_default(),
            status,
            content: input.content,
            content_blocks: prepare_blocks(input.content_blocks),
            parent_id: input.parent_id,
            order: input.order,
            show_in_nav: input.show_in_nav,
            show_in_footer: input.show_in_footer,
            seo,
            language: input.language.unwrap_or_default(),
            created_by: user.id,
            updated_by: Some(user.id),
            published_at: (status == PageStatus::Published).then_some(now),
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&page).await.map_err(|e| slug_conflict(e, &page.slug))?;
        invalidate_sitemap(&self.cache).await;
        info!(page_id = created.id, slug = %created.slug, "Page created");
        Ok(created)
    }

    pub async fn update(&self, id: i64, input: UpdatePageInput, user: &User) -> Result<Page, PageServiceError> {
        let mut page = self.repo.get_by_id(id).await?.ok_or(PageServiceError::NotFound)?;

        if let Some(title) = &input.title {
            page.title = validate_title(title)?;
        }
        if let Some(slug) = &input.slug {
            let slug = validate_slug(slug)?;
            if slug != page.slug {
                if self.repo.slug_exists(&slug, Some(id)).await? {
                    return Err(PageServiceError::DuplicateSlug(slug));
                }
                page.slug = slug;
            }
        }
        if let Some(seo) = input.seo {
            validate_seo(&seo)?;
            page.seo = seo;
        }
        if let Some(parent) = input.parent_id {
            if let Some(parent_id) = parent {
                self.check_parent(id, parent_id).await?;
            }
            page.parent_id = parent;
        }
        if let Some(template) = input.template {
            page.template = template;
        }
        if let Some(content) = input.content {
            page.content = Some(content);
        }
        if let Some(blocks) = input.content_blocks {
            page.content_blocks = prepare_blocks(blocks);
        }
        if let Some(order) = input.order {
            page.order = order;
        }
        if let Some(show) = input.show_in_nav {
            page.show_in_nav = show;
        }
        if let Some(show) = input.show_in_footer {
            page.show_in_footer = show;
        }
        if let Some(language) = input.language {
            page.language = language;
        }

        let now = Utc::now();
        if let Some(status) = input.status {
            page.status = status;
        }
        if page.status == PageStatus::Published && page.published_at.is_none() {
            page.published_at = Some(now);
        }
        page.updated_by = Some(user.id);
        page.updated_at = now;

        let updated = self.repo.update(&page).await.map_err(|e| slug_conflict(e, &page.slug))?;
        invalidate_sitemap(&self.cache).await;
        info!(page_id = id, user_id = user.id, "Page updated");
        Ok(updated)
    }

    /// Delete a childless page, then the media files only it linked to
    pub async fn delete(&self, id: i64) -> Result<(), PageServiceError> {
        let page = self.repo.get_by_id(id).await?.ok_or(PageServiceError::NotFound)?;
        if self.repo.count_children(id).await? > 0 {
            return Err(PageServiceError::HasChildren);
        }
        if !self.repo.delete(id).await? {
            return Err(PageServiceError::NotFound);
        }
        invalidate_sitemap(&self.cache).await;
        info!(page_id = id, "Page deleted");

        let mut urls: Vec<String> = page.seo.og_image.into_iter().collect();
        for block in &page.content_blocks {
            collect_media_urls(&block.content, &mut urls);
        }
        remove_unreferenced(self.media.as_ref(), self.post_repo.as_ref(), self.repo.as_ref(), urls).await;
        Ok(())
    }

    /// Apply a batch of order and parent changes.
    ///
    /// The whole batch is checked against the current tree first: every id
    /// and parent must exist and the resulting tree must be acyclic.
    pub async fn reorder(&self, items: &[PageOrderItem]) -> Result<(), PageServiceError> {
        let pages = self.repo.list(&PageFilter::default()).await?;
        let mut parents: HashMap<i64, Option<i64>> = pages.iter().map(|p| (p.id, p.parent_id)).collect();

        for item in items {
            if !parents.contains_key(&item.id) {
                return Err(FieldViolation::new("id", format!("Page {} does not exist", item.id)).into());
            }
            if let Some(parent_id) = item.parent_id {
                if !parents.contains_key(&parent_id) {
                    return Err(parent_missing(parent_id).into());
                }
            }
        }
        for item in items {
            parents.insert(item.id, item.parent_id);
        }
        for item in items {
            if has_cycle(&parents, item.id) {
                return Err(cycle_violation().into());
            }
        }

        self.repo.reorder(items).await?;
        invalidate_sitemap(&self.cache).await;
        info!(count = items.len(), "Pages reordered");
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Page>, PageServiceError> {
        Ok(self.repo.get_by_id(id).await?)
    }

    /// Page by slug; unless `include_unpublished`, only published pages resolve
    pub async fn get_by_slug(&self, slug: &str, include_unpublished: bool) -> Result<Option<Page>, PageServiceError> {
        let page = self.repo.get_by_slug(slug).await?;
        Ok(page.filter(|p| include_unpublished || p.status == PageStatus::Published))
    }

    pub async fn list(&self, filter: &PageFilter) -> Result<Vec<Page>, PageServiceError> {
        Ok(self.repo.list(filter).await?)
    }

    /// Tree of published pages shown in navigation.
    ///
    /// Pages whose parent is not itself in the navigation are left out.
    pub async fn navigation(&self, language: Language) -> Result<Vec<NavNode>, PageServiceError> {
        let pages = self
            .repo
            .list(&PageFilter {
                status: Some(PageStatus::Published),
                language: Some(language),
                ..Default::default()
            })
            .await?;
        let visible: Vec<Page> = pages.into_iter().filter(|p| p.show_in_nav).collect();

        let mut children: HashMap<Option<i64>, Vec<&Page>> = HashMap::new();
        for page in &visible {
            children.entry(page.parent_id).or_default().push(page);
        }
        Ok(build_nav(&children, None, &mut HashSet::new()))
    }

    async fn require_parent(&self, parent_id: i64) -> Result<(), PageServiceError> {
        if self.repo.get_by_id(parent_id).await?.is_none() {
            return Err(parent_missing(parent_id).into());
        }
        Ok(())
    }

    /// `parent_id` must exist and must not be `id` or one of its descendants
    async fn check_parent(&self, id: i64, parent_id: i64) -> Result<(), PageServiceError> {
        if parent_id == id {
            return Err(cycle_violation().into());
        }
        self.require_parent(parent_id).await?;
        if self.repo.ancestor_ids(parent_id).await?.contains(&id) {
            return Err(cycle_violation().into());
        }
        Ok(())
    }
}

fn slug_conflict(err: anyhow::Error, slug: &str) -> PageServiceError {
    if is_unique_violation(&err) {
        PageServiceError::DuplicateSlug(slug.to_string())
    } else {
        PageServiceError::Internal(err)
    }
}

fn parent_missing(parent_id: i64) -> FieldViolation {
    FieldViolation::new("parent_id", format!("Parent page {} does not exist", parent_id))
}

fn cycle_violation() -> FieldViolation {
    FieldViolation::new("parent_id", "A page cannot be its own ancestor")
}

/// Assign ids to new blocks and sort by `order`
fn prepare_blocks(mut blocks: Vec<ContentBlock>) -> Vec<ContentBlock> {
    for block in &mut blocks {
        if block.id.trim().is_empty() {
            block.id = Uuid::new_v4().to_string();
        }
    }
    blocks.sort_by_key(|block| block.order);
    blocks
}

/// Gather string values stored under media keys anywhere in block content
fn collect_media_urls(value: &serde_json::Value, urls: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                match value {
                    serde_json::Value::String(url) if MEDIA_KEYS.contains(&key.as_str()) => {
                        urls.push(url.clone());
                    }
                    serde_json::Value::Array(items) if MEDIA_KEYS.contains(&key.as_str()) => {
                        for item in items {
                            match item {
                                serde_json::Value::String(url) => urls.push(url.clone()),
                                other => collect_media_urls(other, urls),
                            }
                        }
                    }
                    other => collect_media_urls(other, urls),
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_media_urls(item, urls);
            }
        }
        _ => {}
    }
}

fn has_cycle(parents: &HashMap<i64, Option<i64>>, start: i64) -> bool {
    let mut seen = HashSet::from([start]);
    let mut current = parents.get(&start).copied().flatten();
    while let Some(id) = current {
        if !seen.insert(id) {
            return true;
        }
        current = parents.get(&id).copied().flatten();
    }
    false
}

fn build_nav(children: &HashMap<Option<i64>, Vec<&Page>>, parent: Option<i64>, path: &mut HashSet<i64>) -> Vec<NavNode> {
    let Some(pages) = children.get(&parent) else {
        return Vec::new();
    };
    let mut nodes = Vec::with_capacity(pages.len());
    for page in pages {
        if !path.insert(page.id) {
            continue;
        }
        nodes.push(NavNode {
            id: page.id,
            title: page.title.clone(),
            slug: page.slug.clone(),
            url: page.url_path(),
            order: page.order,
            children: build_nav(children, Some(page.id), path),
        });
        path.remove(&page.id);
    }
    nodes
}
