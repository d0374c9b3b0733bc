//! Blog post service
//!
//! Create, update, duplicate and delete posts. Every content change
//! re-renders `content_html` and recomputes `read_time`; `published_at` is
//! stamped the first time a post reaches `published` and never cleared.
//! Mutations drop the cached sitemap.

use crate::cache::Cache;
use crate::db::is_unique_violation;
use crate::db::repositories::{PageRepository, PostRepository};
use crate::models::{
    BlogPost, CategoryCount, CreatePostInput, ListParams, PagedResult, PostFilter, PostStatus,
    TagCount, UpdatePostInput, User, EXCERPT_MAX,
};
use crate::services::markdown::MarkdownRenderer;
use crate::services::media::{remove_unreferenced, MediaStore};
use crate::services::sitemap::invalidate_sitemap;
use crate::services::slug::first_free_slug;
use crate::services::validation::{
    normalize_tags, read_time, resolve_slug, validate_max_len, validate_seo, validate_slug,
    validate_title, FieldViolation,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TOP_TAGS_LIMIT: i64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found")]
    NotFound,

    #[error("{0}")]
    Validation(FieldViolation),

    #[error("Post slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Not authorized to modify this post")]
    Forbidden,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<FieldViolation> for PostServiceError {
    fn from(violation: FieldViolation) -> Self {
        PostServiceError::Validation(violation)
    }
}

pub struct PostService {
    repo: Arc<dyn PostRepository>,
    page_repo: Arc<dyn PageRepository>,
    cache: Arc<Cache>,
    renderer: MarkdownRenderer,
    media: Arc<dyn MediaStore>,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        page_repo: Arc<dyn PageRepository>,
        cache: Arc<Cache>,
        renderer: MarkdownRenderer,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            repo,
            page_repo,
            cache,
            renderer,
            media,
        }
    }

    /// Validate and store a new post authored by `author`
    pub async fn create(&self, input: CreatePostInput, author: &User) -> Result<BlogPost, PostServiceError> {
        let title = validate_title(&input.title)?;
        if input.content.trim().is_empty() {
            return Err(FieldViolation::new("content", "Content is required").into());
        }
        if let Some(excerpt) = &input.excerpt {
            validate_max_len("excerpt", excerpt, EXCERPT_MAX)?;
        }
        let seo = input.seo.unwrap_or_default();
        validate_seo(&seo)?;

        let slug = resolve_slug(input.slug.as_deref(), &title)?;
        if self.repo.slug_exists(&slug, None).await? {
            return Err(PostServiceError::DuplicateSlug(slug));
        }

        let now = Utc::now();
        let status = input.status.unwrap_or_default();
        if status == PostStatus::Scheduled {
            check_schedule(input.scheduled_at, now)?;
        }

        let post = BlogPost {
            id: 0,
            title,
            slug,
            excerpt: input.excerpt,
            content_html: self.renderer.render(&input.content),
            read_time: read_time(&input.content),
            content: input.content,
            featured_image: input.featured_image,
            category: input.category.unwrap_or_default(),
            tags: normalize_tags(&input.tags),
            author_id: author.id,
            status,
            published_at: (status == PostStatus::Published).then_some(now),
            scheduled_at: input.scheduled_at,
            seo,
            views: 0,
            language: input.language.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&post).await.map_err(|e| slug_conflict(e, &post.slug))?;
        invalidate_sitemap(&self.cache).await;
        info!(post_id = created.id, slug = %created.slug, status = %created.status, "Post created");
        Ok(created)
    }

    /// Apply a partial update. Title edits never regenerate the slug.
    pub async fn update(
        &self,
        id: i64,
        input: UpdatePostInput,
        editor: &User,
    ) -> Result<BlogPost, PostServiceError> {
        let mut post = self.repo.get_by_id(id).await?.ok_or(PostServiceError::NotFound)?;
        if !editor.can_edit(post.author_id) {
            return Err(PostServiceError::Forbidden);
        }

        if let Some(title) = &input.title {
            post.title = validate_title(title)?;
        }
        if let Some(slug) = &input.slug {
            let slug = validate_slug(slug)?;
            if slug != post.slug {
                if self.repo.slug_exists(&slug, Some(id)).await? {
                    return Err(PostServiceError::DuplicateSlug(slug));
                }
                post.slug = slug;
            }
        }
        if let Some(excerpt) = input.excerpt {
            validate_max_len("excerpt", &excerpt, EXCERPT_MAX)?;
            post.excerpt = Some(excerpt);
        }
        if let Some(content) = input.content {
            if content.trim().is_empty() {
                return Err(FieldViolation::new("content", "Content is required").into());
            }
            if content != post.content {
                post.content_html = self.renderer.render(&content);
                post.read_time = read_time(&content);
                post.content = content;
            }
        }
        if let Some(seo) = input.seo {
            validate_seo(&seo)?;
            post.seo = seo;
        }
        if let Some(image) = input.featured_image {
            post.featured_image = Some(image);
        }
        if let Some(category) = input.category {
            post.category = category;
        }
        if let Some(tags) = &input.tags {
            post.tags = normalize_tags(tags);
        }
        if let Some(language) = input.language {
            post.language = language;
        }
        if let Some(at) = input.scheduled_at {
            post.scheduled_at = Some(at);
        }

        let now = Utc::now();
        if let Some(status) = input.status {
            if status == PostStatus::Scheduled && post.status != PostStatus::Scheduled {
                check_schedule(post.scheduled_at, now)?;
            }
            post.status = status;
        } else if post.status == PostStatus::Scheduled && input.scheduled_at.is_some() {
            check_schedule(post.scheduled_at, now)?;
        }
        if post.status == PostStatus::Published && post.published_at.is_none() {
            post.published_at = Some(now);
        }
        post.updated_at = now;

        let updated = self.repo.update(&post).await.map_err(|e| slug_conflict(e, &post.slug))?;
        invalidate_sitemap(&self.cache).await;
        info!(post_id = id, editor_id = editor.id, "Post updated");
        Ok(updated)
    }

    /// Delete a post (editors and admins only), then the featured and
    /// Open Graph image files nothing else links to
    pub async fn delete(&self, id: i64, user: &User) -> Result<(), PostServiceError> {
        if !user.is_editor() {
            return Err(PostServiceError::Forbidden);
        }
        let post = self.repo.get_by_id(id).await?.ok_or(PostServiceError::NotFound)?;

        if !self.repo.delete(id).await? {
            return Err(PostServiceError::NotFound);
        }
        invalidate_sitemap(&self.cache).await;
        info!(post_id = id, user_id = user.id, "Post deleted");

        let urls = post.featured_image.map(|image| image.url).into_iter().chain(post.seo.og_image);
        remove_unreferenced(self.media.as_ref(), self.repo.as_ref(), self.page_repo.as_ref(), urls).await;
        Ok(())
    }

    /// Copy a post's editable fields into a new draft owned by `author`
    pub async fn duplicate(&self, id: i64, author: &User) -> Result<BlogPost, PostServiceError> {
        let original = self.repo.get_by_id(id).await?.ok_or(PostServiceError::NotFound)?;

        let title = format!("{} (Copy)", original.title);
        let base = resolve_slug(None, &title)?;
        let repo = self.repo.clone();
        let slug = first_free_slug(&base, |candidate| {
            let repo = repo.clone();
            async move { repo.slug_exists(&candidate, None).await }
        })
        .await?;

        let now = Utc::now();
        let copy = BlogPost {
            id: 0,
            title,
            slug,
            author_id: author.id,
            status: PostStatus::Draft,
            published_at: None,
            scheduled_at: None,
            views: 0,
            created_at: now,
            updated_at: now,
            ..original
        };

        let created = self.repo.create(&copy).await.map_err(|e| slug_conflict(e, &copy.slug))?;
        info!(post_id = created.id, source_id = id, "Post duplicated");
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<BlogPost>, PostServiceError> {
        Ok(self.repo.get_by_id(id).await?)
    }

    /// Post by slug; unless `include_unpublished`, only live posts resolve
    pub async fn get_by_slug(
        &self,
        slug: &str,
        include_unpublished: bool,
    ) -> Result<Option<BlogPost>, PostServiceError> {
        let post = self.repo.get_by_slug(slug).await?;
        let now = Utc::now();
        Ok(post.filter(|p| include_unpublished || p.is_live(now)))
    }

    pub async fn list(
        &self,
        filter: &PostFilter,
        params: &ListParams,
    ) -> Result<PagedResult<BlogPost>, PostServiceError> {
        let (items, total) = self.repo.list(filter, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Published post counts per category
    pub async fn categories(&self) -> Result<Vec<CategoryCount>, PostServiceError> {
        Ok(self.repo.category_counts(true).await?)
    }

    /// Most used tags on published posts
    pub async fn tags(&self) -> Result<Vec<TagCount>, PostServiceError> {
        Ok(self.repo.tag_counts(TOP_TAGS_LIMIT).await?)
    }

    /// Count a view; failures are logged and never reach the reader
    pub async fn increment_views(&self, id: i64) {
        match self.repo.increment_views(id).await {
            Ok(true) => {}
            Ok(false) => debug!(post_id = id, "View not counted: post missing"),
            Err(e) => warn!(post_id = id, "Failed to increment views: {:#}", e),
        }
    }
}

/// A concurrent writer can claim the slug between the check and the write
fn slug_conflict(err: anyhow::Error, slug: &str) -> PostServiceError {
    if is_unique_violation(&err) {
        PostServiceError::DuplicateSlug(slug.to_string())
    } else {
        PostServiceError::Internal(err)
    }
}

fn check_schedule(scheduled_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<(), FieldViolation> {
    match scheduled_at {
        Some(at) if at > now => Ok(()),
        Some(_) => Err(FieldViolation::new("scheduled_at", "Scheduled time must be in the future")),
        None => Err(FieldViolation::new(
            "scheduled_at",
            "Scheduled posts require a scheduled time",
        )),
    }
}
