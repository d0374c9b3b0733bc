//! Blog post repository
//!
//! Posts keep their SEO block, featured image and tag list as JSON text
//! columns. Tag filtering and tag counts go through SQLite's `json_each`.

use crate::db::{sqlite, DynDatabasePool};
use crate::models::{
    BlogPost, CategoryCount, FeaturedImage, Language, ListParams, PostCategory, PostFilter,
    PostStatus, SeoMeta, TagCount,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const POST_COLUMNS: &str = "id, title, slug, excerpt, content, content_html, featured_image, \
    category, tags, author_id, status, published_at, scheduled_at, seo, views, read_time, \
    language, created_at, updated_at";

/// Blog post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a post; `post.id` is ignored
    async fn create(&self, post: &BlogPost) -> Result<BlogPost>;

    /// Write every editable column of an existing post
    async fn update(&self, post: &BlogPost) -> Result<BlogPost>;

    async fn get_by_id(&self, id: i64) -> Result<Option<BlogPost>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<BlogPost>>;

    /// Whether another post already uses `slug`
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Returns false when no row matched
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Filtered page of posts plus the total match count
    async fn list(&self, filter: &PostFilter, params: &ListParams) -> Result<(Vec<BlogPost>, i64)>;

    /// Every post matching the filter, unpaginated
    async fn list_all(&self, filter: &PostFilter) -> Result<Vec<BlogPost>>;

    /// Atomic `views = views + 1`; false when no post matched
    async fn increment_views(&self, id: i64) -> Result<bool>;

    /// Atomic increment for a published post addressed by slug
    async fn increment_views_by_slug(&self, slug: &str) -> Result<bool>;

    async fn category_counts(&self, published_only: bool) -> Result<Vec<CategoryCount>>;

    /// Most used tags among published posts
    async fn tag_counts(&self, limit: i64) -> Result<Vec<TagCount>>;

    async fn count(&self, status: Option<PostStatus>) -> Result<i64>;

    async fn total_views(&self) -> Result<i64>;

    /// Newest posts by creation time, any status
    async fn recent(&self, limit: i64) -> Result<Vec<BlogPost>>;

    /// Published posts ordered by views
    async fn top_viewed(&self, limit: i64, published_since: Option<DateTime<Utc>>) -> Result<Vec<BlogPost>>;

    async fn count_published_since(&self, since: DateTime<Utc>) -> Result<i64>;

    /// Whether any post other than `exclude_id` references the media URL
    async fn references_media(&self, url: &str, exclude_id: Option<i64>) -> Result<bool>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }

    fn pool(&self) -> Result<&SqlitePool> {
        sqlite(&self.pool)
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &BlogPost) -> Result<BlogPost> {
        let result = sqlx::query(
            r#"
            INSERT INTO posts (title, slug, excerpt, content, content_html, featured_image,
                category, tags, author_id, status, published_at, scheduled_at, seo, views,
                read_time, language, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.excerpt)
        .bind(&post.content)
        .bind(&post.content_html)
        .bind(to_json_opt(&post.featured_image)?)
        .bind(post.category.as_str())
        .bind(serde_json::to_string(&post.tags)?)
        .bind(post.author_id)
        .bind(post.status.as_str())
        .bind(post.published_at)
        .bind(post.scheduled_at)
        .bind(serde_json::to_string(&post.seo)?)
        .bind(post.views)
        .bind(post.read_time)
        .bind(post.language.as_str())
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(self.pool()?)
        .await
        .context("Failed to create post")?;

        Ok(BlogPost {
            id: result.last_insert_rowid(),
            ..post.clone()
        })
    }

    async fn update(&self, post: &BlogPost) -> Result<BlogPost> {
        // views are written only by the increment queries
        sqlx::query(
            r#"
            UPDATE posts SET title = ?, slug = ?, excerpt = ?, content = ?, content_html = ?,
                featured_image = ?, category = ?, tags = ?, status = ?, published_at = ?,
                scheduled_at = ?, seo = ?, read_time = ?, language = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.excerpt)
        .bind(&post.content)
        .bind(&post.content_html)
        .bind(to_json_opt(&post.featured_image)?)
        .bind(post.category.as_str())
        .bind(serde_json::to_string(&post.tags)?)
        .bind(post.status.as_str())
        .bind(post.published_at)
        .bind(post.scheduled_at)
        .bind(serde_json::to_string(&post.seo)?)
        .bind(post.read_time)
        .bind(post.language.as_str())
        .bind(post.updated_at)
        .bind(post.id)
        .execute(self.pool()?)
        .await
        .context("Failed to update post")?;

        self.get_by_id(post.id)
            .await?
            .with_context(|| format!("Post {} vanished during update", post.id))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<BlogPost>> {
        let sql = format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool()?)
            .await
            .context("Failed to get post by ID")?;
        row.as_ref().map(row_to_post).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<BlogPost>> {
        let sql = format!("SELECT {} FROM posts WHERE slug = ?", POST_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(self.pool()?)
            .await
            .context("Failed to get post by slug")?;
        row.as_ref().map(row_to_post).transpose()
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM posts WHERE slug = ? AND id != ?")
            .bind(slug)
            .bind(exclude_id.unwrap_or(-1))
            .fetch_one(self.pool()?)
            .await
            .context("Failed to check post slug")?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(self.pool()?)
            .await
            .context("Failed to delete post")?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &PostFilter, params: &ListParams) -> Result<(Vec<BlogPost>, i64)> {
        let pool = self.pool()?;

        let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count FROM posts WHERE 1=1");
        push_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build()
            .fetch_one(pool)
            .await
            .context("Failed to count posts")?
            .get("count");

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM posts WHERE 1=1", POST_COLUMNS));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY published_at IS NULL, published_at DESC, created_at DESC, id DESC LIMIT ");
        qb.push_bind(params.limit());
        qb.push(" OFFSET ");
        qb.push_bind(params.offset());

        let rows = qb.build().fetch_all(pool).await.context("Failed to list posts")?;
        let posts = rows.iter().map(row_to_post).collect::<Result<Vec<_>>>()?;
        Ok((posts, total))
    }

    async fn list_all(&self, filter: &PostFilter) -> Result<Vec<BlogPost>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM posts WHERE 1=1", POST_COLUMNS));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY published_at IS NULL, published_at DESC, created_at DESC, id DESC");

        let rows = qb
            .build()
            .fetch_all(self.pool()?)
            .await
            .context("Failed to list posts")?;
        rows.iter().map(row_to_post).collect()
    }

    async fn increment_views(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE posts SET views = views + 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool()?)
            .await
            .context("Failed to increment post views")?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_views_by_slug(&self, slug: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE posts SET views = views + 1 WHERE slug = ? AND status = 'published'",
        )
        .bind(slug)
        .execute(self.pool()?)
        .await
        .context("Failed to increment post views")?;
        Ok(result.rows_affected() > 0)
    }

    async fn category_counts(&self, published_only: bool) -> Result<Vec<CategoryCount>> {
        let sql = if published_only {
            "SELECT category, COUNT(*) AS count FROM posts WHERE status = 'published' GROUP BY category ORDER BY count DESC, category ASC"
        } else {
            "SELECT category, COUNT(*) AS count FROM posts GROUP BY category ORDER BY count DESC, category ASC"
        };
        let rows = sqlx::query(sql)
            .fetch_all(self.pool()?)
            .await
            .context("Failed to count posts by category")?;

        rows.iter()
            .map(|row| {
                let category: String = row.get("category");
                Ok(CategoryCount {
                    category: PostCategory::from_str(&category)?,
                    count: row.get("count"),
                })
            })
            .collect()
    }

    async fn tag_counts(&self, limit: i64) -> Result<Vec<TagCount>> {
        let rows = sqlx::query(
            r#"
            SELECT t.value AS tag, COUNT(*) AS count
            FROM posts, json_each(posts.tags) AS t
            WHERE posts.status = 'published'
            GROUP BY t.value
            ORDER BY count DESC, tag ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool()?)
        .await
        .context("Failed to count tags")?;

        Ok(rows
            .iter()
            .map(|row| TagCount {
                tag: row.get("tag"),
                count: row.get("count"),
            })
            .collect())
    }

    async fn count(&self, status: Option<PostStatus>) -> Result<i64> {
        let row = match status {
            Some(status) => {
                sqlx::query("SELECT COUNT(*) AS count FROM posts WHERE status = ?")
                    .bind(status.as_str())
                    .fetch_one(self.pool()?)
                    .await
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS count FROM posts")
                    .fetch_one(self.pool()?)
                    .await
            }
        }
        .context("Failed to count posts")?;
        Ok(row.get("count"))
    }

    async fn total_views(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COALESCE(SUM(views), 0) AS total FROM posts")
            .fetch_one(self.pool()?)
            .await
            .context("Failed to sum post views")?;
        Ok(row.get("total"))
    }

    async fn recent(&self, limit: i64) -> Result<Vec<BlogPost>> {
        let sql = format!(
            "SELECT {} FROM posts ORDER BY created_at DESC, id DESC LIMIT ?",
            POST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(self.pool()?)
            .await
            .context("Failed to list recent posts")?;
        rows.iter().map(row_to_post).collect()
    }

    async fn top_viewed(&self, limit: i64, published_since: Option<DateTime<Utc>>) -> Result<Vec<BlogPost>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM posts WHERE status = 'published'",
            POST_COLUMNS
        ));
        if let Some(since) = published_since {
            qb.push(" AND published_at >= ");
            qb.push_bind(since);
        }
        qb.push(" ORDER BY views DESC, published_at DESC, id DESC LIMIT ");
        qb.push_bind(limit);

        let rows = qb
            .build()
            .fetch_all(self.pool()?)
            .await
            .context("Failed to list top posts")?;
        rows.iter().map(row_to_post).collect()
    }

    async fn count_published_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM posts WHERE published_at >= ?")
            .bind(since)
            .fetch_one(self.pool()?)
            .await
            .context("Failed to count recently published posts")?;
        Ok(row.get("count"))
    }

    async fn references_media(&self, url: &str, exclude_id: Option<i64>) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM posts
            WHERE id != ?
              AND (json_extract(featured_image, '$.url') = ?
                   OR json_extract(seo, '$.og_image') = ?
                   OR instr(content, ?) > 0)
            "#,
        )
        .bind(exclude_id.unwrap_or(-1))
        .bind(url)
        .bind(url)
        .bind(url)
        .fetch_one(self.pool()?)
        .await
        .context("Failed to check media references")?;
        Ok(row.get::<i64, _>("count") > 0)
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &PostFilter) {
    if filter.live_only {
        qb.push(" AND status = 'published' AND published_at IS NOT NULL AND published_at <= ");
        qb.push_bind(Utc::now());
    } else if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(category) = filter.category {
        qb.push(" AND category = ");
        qb.push_bind(category.as_str());
    }
    if let Some(language) = filter.language {
        qb.push(" AND language = ");
        qb.push_bind(language.as_str());
    }
    if let Some(author_id) = filter.author_id {
        qb.push(" AND author_id = ");
        qb.push_bind(author_id);
    }
    if let Some(tag) = filter.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        qb.push(" AND EXISTS (SELECT 1 FROM json_each(posts.tags) AS t WHERE t.value = ");
        qb.push_bind(tag.to_lowercase());
        qb.push(")");
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (title LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR excerpt LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR content LIKE ");
        qb.push_bind(pattern);
        qb.push(" ESCAPE '\\')");
    }
}

pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub(crate) fn to_json_opt<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(|v| serde_json::to_string(v).context("Failed to encode JSON column"))
        .transpose()
}

pub(crate) fn seo_from_column(raw: Option<String>) -> Result<SeoMeta> {
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some("null") => Ok(SeoMeta::default()),
        Some(json) => serde_json::from_str(json).context("Malformed SEO column"),
    }
}

fn row_to_post(row: &SqliteRow) -> Result<BlogPost> {
    let category: String = row.get("category");
    let status: String = row.get("status");
    let language: String = row.get("language");
    let tags: String = row.get("tags");
    let featured_image: Option<String> = row.get("featured_image");

    Ok(BlogPost {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        excerpt: row.get("excerpt"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        featured_image: featured_image
            .map(|json| serde_json::from_str::<FeaturedImage>(&json))
            .transpose()
            .context("Malformed featured_image column")?,
        category: PostCategory::from_str(&category)?,
        tags: serde_json::from_str(&tags).context("Malformed tags column")?,
        author_id: row.get("author_id"),
        status: PostStatus::from_str(&status)?,
        published_at: row.get("published_at"),
        scheduled_at: row.get("scheduled_at"),
        seo: seo_from_column(row.get("seo"))?,
        views: row.get("views"),
        read_time: row.get("read_time"),
        language: Language::from_str(&language)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
