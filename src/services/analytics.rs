//! Dashboard statistics, SEO health and view tracking

use crate::db::repositories::{PageRepository, PostRepository};
use crate::models::{
    BlogPost, CategoryCount, ContentKind, PageFilter, PageStatus, PostCategory, PostFilter,
    PostStatus,
};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

const DASHBOARD_LIST_LIMIT: i64 = 5;
const TOP_PERFORMING_LIMIT: i64 = 10;

/// Reporting window for content analytics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "7d")]
    Week,
    #[default]
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl Period {
    pub fn days(&self) -> i64 {
        match self {
            Period::Week => 7,
            Period::Month => 30,
            Period::Quarter => 90,
        }
    }

    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.days())
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(Period::Week),
            "30d" => Ok(Period::Month),
            "90d" => Ok(Period::Quarter),
            _ => Err(anyhow::anyhow!("Invalid period: {}", s)),
        }
    }
}

/// Compact post row used in dashboard lists
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub status: PostStatus,
    pub category: PostCategory,
    pub views: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<BlogPost> for PostSummary {
    fn from(post: BlogPost) -> Self {
        Self {
            id: post.id,
            title: post.title,
            slug: post.slug,
            status: post.status,
            category: post.category,
            views: post.views,
            published_at: post.published_at,
            created_at: post.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_posts: i64,
    pub published_posts: i64,
    pub draft_posts: i64,
    pub total_pages: i64,
    pub total_views: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub overview: Overview,
    pub recent_posts: Vec<PostSummary>,
    pub top_posts: Vec<PostSummary>,
    pub posts_by_category: Vec<CategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentReport {
    pub period: Period,
    pub published_in_period: i64,
    pub top_performing: Vec<PostSummary>,
}

/// SEO field coverage across published posts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostSeoHealth {
    pub total: usize,
    pub with_meta_title: usize,
    pub with_meta_description: usize,
    pub with_focus_keyword: usize,
    pub with_featured_image: usize,
    pub meta_title_percentage: u8,
    pub meta_description_percentage: u8,
    pub focus_keyword_percentage: u8,
    pub featured_image_percentage: u8,
}

/// SEO field coverage across published pages
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageSeoHealth {
    pub total: usize,
    pub with_meta_title: usize,
    pub with_meta_description: usize,
    pub with_focus_keyword: usize,
    pub meta_title_percentage: u8,
    pub meta_description_percentage: u8,
    pub focus_keyword_percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeoHealth {
    pub posts: PostSeoHealth,
    pub pages: PageSeoHealth,
    pub overall_score: u8,
}

/// `round(100 * value / total)`, 0 for an empty total
pub fn percentage(value: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (100.0 * value as f64 / total as f64).round() as u8
}

pub struct AnalyticsService {
    posts: Arc<dyn PostRepository>,
    pages: Arc<dyn PageRepository>,
}

impl AnalyticsService {
    pub fn new(posts: Arc<dyn PostRepository>, pages: Arc<dyn PageRepository>) -> Self {
        Self { posts, pages }
    }

    pub async fn dashboard(&self) -> Result<Dashboard> {
        let (total_posts, published_posts, draft_posts, total_pages, total_views) = tokio::try_join!(
            self.posts.count(None),
            self.posts.count(Some(PostStatus::Published)),
            self.posts.count(Some(PostStatus::Draft)),
            self.pages.count(None),
            self.posts.total_views(),
        )?;
        let (recent, top, posts_by_category) = tokio::try_join!(
            self.posts.recent(DASHBOARD_LIST_LIMIT),
            self.posts.top_viewed(DASHBOARD_LIST_LIMIT, None),
            self.posts.category_counts(false),
        )?;

        Ok(Dashboard {
            overview: Overview {
                total_posts,
                published_posts,
                draft_posts,
                total_pages,
                total_views,
            },
            recent_posts: recent.into_iter().map(PostSummary::from).collect(),
            top_posts: top.into_iter().map(PostSummary::from).collect(),
            posts_by_category,
        })
    }

    /// Posts published within `period` and the most viewed of them
    pub async fn content(&self, period: Period) -> Result<ContentReport> {
        let since = period.start(Utc::now());
        let (published_in_period, top) = tokio::try_join!(
            self.posts.count_published_since(since),
            self.posts.top_viewed(TOP_PERFORMING_LIMIT, Some(since)),
        )?;
        Ok(ContentReport {
            period,
            published_in_period,
            top_performing: top.into_iter().map(PostSummary::from).collect(),
        })
    }

    /// Coverage of SEO fields over published content
    pub async fn seo_health(&self) -> Result<SeoHealth> {
        let posts = self
            .posts
            .list_all(&PostFilter {
                status: Some(PostStatus::Published),
                ..Default::default()
            })
            .await?;
        let pages = self
            .pages
            .list(&PageFilter {
                status: Some(PageStatus::Published),
                ..Default::default()
            })
            .await?;

        let mut post_health = PostSeoHealth {
            total: posts.len(),
            ..Default::default()
        };
        for post in &posts {
            post_health.with_meta_title += post.seo.meta_title().is_some() as usize;
            post_health.with_meta_description += post.seo.meta_description().is_some() as usize;
            post_health.with_focus_keyword += post.seo.focus_keyword().is_some() as usize;
            post_health.with_featured_image +=
                post.featured_image.as_ref().is_some_and(|image| !image.url.trim().is_empty()) as usize;
        }
        post_health.meta_title_percentage = percentage(post_health.with_meta_title, post_health.total);
        post_health.meta_description_percentage = percentage(post_health.with_meta_description, post_health.total);
        post_health.focus_keyword_percentage = percentage(post_health.with_focus_keyword, post_health.total);
        post_health.featured_image_percentage = percentage(post_health.with_featured_image, post_health.total);

        let mut page_health = PageSeoHealth {
            total: pages.len(),
            ..Default::default()
        };
        for page in &pages {
            page_health.with_meta_title += page.seo.meta_title().is_some() as usize;
            page_health.with_meta_description += page.seo.meta_description().is_some() as usize;
            page_health.with_focus_keyword += page.seo.focus_keyword().is_some() as usize;
        }
        page_health.meta_title_percentage = percentage(page_health.with_meta_title, page_health.total);
        page_health.meta_description_percentage = percentage(page_health.with_meta_description, page_health.total);
        page_health.focus_keyword_percentage = percentage(page_health.with_focus_keyword, page_health.total);

        let completed = post_health.with_meta_title
            + post_health.with_meta_description
            + post_health.with_focus_keyword
            + post_health.with_featured_image
            + page_health.with_meta_title
            + page_health.with_meta_description
            + page_health.with_focus_keyword;
        let total_checks = post_health.total * 4 + page_health.total * 3;
        let overall_score = if total_checks == 0 {
            100
        } else {
            percentage(completed, total_checks)
        };

        Ok(SeoHealth {
            posts: post_health,
            pages: page_health,
            overall_score,
        })
    }

    /// Count a public view of a published post.
    ///
    /// Only blog posts are counted. Failures are logged and dropped so the
    /// reader's request always succeeds.
    pub async fn track_view(&self, kind: ContentKind, slug: &str) {
        if kind != ContentKind::Blog {
            debug!(kind = %kind, slug, "View tracking skipped for non-blog content");
            return;
        }
        match self.posts.increment_views_by_slug(slug).await {
            Ok(true) => {}
            Ok(false) => debug!(slug, "View not counted: no published post with this slug"),
            Err(e) => warn!(slug, "Failed to track view: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxPageRepository, SqlxPostRepository};
    use crate::db::{create_test_pool, migrations, sqlite, DynDatabasePool};

    async fn setup() -> (DynDatabasePool, AnalyticsService) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash) VALUES (1, 'u', 'u@example.com', 'h')",
        )
        .execute(sqlite(&pool).unwrap())
        .await
        .unwrap();
        let service = AnalyticsService::new(
            SqlxPostRepository::boxed(pool.clone()),
            SqlxPageRepository::boxed(pool.clone()),
        );
        (pool, service)
    }

    async fn insert_post(pool: &DynDatabasePool, slug: &str, status: &str, views: i64, seo: &str, image: Option<&str>) {
        let published_at = (status == "published").then(|| Utc::now() - Duration::days(2));
        sqlx::query(
            "INSERT INTO posts (title, slug, content, content_html, author_id, status, published_at, seo, featured_image, views, created_at, updated_at) \
             VALUES (?, ?, 'body', '<p>body</p>', 1, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(slug)
        .bind(slug)
        .bind(status)
        .bind(published_at)
        .bind(seo)
        .bind(image)
        .bind(views)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(sqlite(pool).unwrap())
        .await
        .unwrap();
    }

    async fn insert_page(pool: &DynDatabasePool, slug: &str, seo: &str) {
        sqlx::query(
            "INSERT INTO pages (title, slug, status, seo, created_by, created_at, updated_at) VALUES (?, ?, 'published', ?, 1, ?, ?)",
        )
        .bind(slug)
        .bind(slug)
        .bind(seo)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(sqlite(pool).unwrap())
        .await
        .unwrap();
    }

    async fn views(pool: &DynDatabasePool, slug: &str) -> i64 {
        sqlx::query_scalar("SELECT views FROM posts WHERE slug = ?")
            .bind(slug)
            .fetch_one(sqlite(pool).unwrap())
            .await
            .unwrap()
    }

    #[test]
    fn test_period_parsing_and_default() {
        assert_eq!(Period::default(), Period::Month);
        assert_eq!("7d".parse::<Period>().unwrap().days(), 7);
        assert_eq!("90d".parse::<Period>().unwrap(), Period::Quarter);
        assert!("1y".parse::<Period>().is_err());
        assert_eq!(serde_json::to_string(&Period::Week).unwrap(), "\"7d\"");
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(3, 3), 100);
    }

    #[tokio::test]
    async fn test_dashboard_counts() {
        let (pool, service) = setup().await;
        insert_post(&pool, "a", "published", 10, "{}", None).await;
        insert_post(&pool, "b", "published", 30, "{}", None).await;
        insert_post(&pool, "c", "draft", 0, "{}", None).await;
        insert_page(&pool, "about", "{}").await;

        let dashboard = service.dashboard().await.unwrap();
        assert_eq!(
            dashboard.overview,
            Overview {
                total_posts: 3,
                published_posts: 2,
                draft_posts: 1,
                total_pages: 1,
                total_views: 40,
            }
        );
        assert_eq!(dashboard.recent_posts.len(), 3);
        let top: Vec<&str> = dashboard.top_posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(top, vec!["b", "a"]);
        assert_eq!(dashboard.posts_by_category[0].count, 3);
    }

    #[tokio::test]
    async fn test_content_report() {
        let (pool, service) = setup().await;
        insert_post(&pool, "recent", "published", 5, "{}", None).await;
        insert_post(&pool, "draft", "draft", 50, "{}", None).await;

        let report = service.content(Period::Week).await.unwrap();
        assert_eq!(report.published_in_period, 1);
        assert_eq!(report.top_performing.len(), 1);
        assert_eq!(report.top_performing[0].slug, "recent");
    }

    #[tokio::test]
    async fn test_seo_health() {
        let (pool, service) = setup().await;
        insert_post(
            &pool,
            "full",
            "published",
            0,
            r#"{"meta_title":"T","meta_description":"D","focus_keyword":"k"}"#,
            Some(r#"{"url":"/uploads/a.png"}"#),
        )
        .await;
        insert_post(&pool, "bare", "published", 0, "{}", None).await;
        insert_post(&pool, "draft", "draft", 0, r#"{"meta_title":"T"}"#, None).await;
        insert_page(&pool, "about", r#"{"meta_title":"About"}"#).await;

        let health = service.seo_health().await.unwrap();
        assert_eq!(health.posts.total, 2);
        assert_eq!(health.posts.with_meta_title, 1);
        assert_eq!(health.posts.meta_title_percentage, 50);
        assert_eq!(health.posts.featured_image_percentage, 50);
        assert_eq!(health.pages.total, 1);
        assert_eq!(health.pages.meta_title_percentage, 100);
        assert_eq!(health.pages.focus_keyword_percentage, 0);
        // 5 of 11 checks
        assert_eq!(health.overall_score, 45);
    }

    #[tokio::test]
    async fn test_seo_health_without_content() {
        let (_pool, service) = setup().await;
        let health = service.seo_health().await.unwrap();
        assert_eq!(health.overall_score, 100);
        assert_eq!(health.posts.meta_title_percentage, 0);
    }

    #[tokio::test]
    async fn test_track_view_only_counts_published_posts() {
        let (pool, service) = setup().await;
        insert_post(&pool, "live", "published", 0, "{}", None).await;
        insert_post(&pool, "hidden", "draft", 0, "{}", None).await;

        service.track_view(ContentKind::Blog, "live").await;
        service.track_view(ContentKind::Blog, "hidden").await;
        service.track_view(ContentKind::Page, "live").await;
        service.track_view(ContentKind::Blog, "missing").await;

        assert_eq!(views(&pool, "live").await, 1);
        assert_eq!(views(&pool, "hidden").await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_track_views_are_not_lost() {
        let (pool, service) = setup().await;
        insert_post(&pool, "popular", "published", 0, "{}", None).await;
        let service = Arc::new(service);

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.track_view(ContentKind::Blog, "popular").await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(views(&pool, "popular").await, 25);
    }
}
