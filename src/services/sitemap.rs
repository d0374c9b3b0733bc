//! Sitemap and robots.txt generation
//!
//! The sitemap is rebuilt from published content on a cache miss and kept in
//! the cache layer under a single key until it expires or content changes.
//! Concurrent rebuilds may both write the cache; the last one wins.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{PageRepository, PostRepository};
use crate::models::{ChangeFrequency, PageFilter, PageStatus, PostFilter, SiteSettings};
use crate::services::settings::SettingsService;
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SITEMAP_CACHE_KEY: &str = "sitemap:xml";

const BLOG_INDEX_PRIORITY: f32 = 0.9;

/// Paths no crawler should visit, always listed when indexing is allowed
const DISALLOWED_PATHS: [&str; 3] = ["/admin/", "/api/", "/uploads/"];

/// Drop the cached sitemap; failures are logged only
pub async fn invalidate_sitemap(cache: &Cache) {
    match cache.delete(SITEMAP_CACHE_KEY).await {
        Ok(()) => debug!("Sitemap cache invalidated"),
        Err(e) => warn!("Failed to invalidate sitemap cache: {:#}", e),
    }
}

/// One `<url>` element
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub path: String,
    pub last_modified: DateTime<Utc>,
    pub change_frequency: ChangeFrequency,
    pub priority: f32,
}

/// Rendered sitemap plus its content hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitemapDocument {
    pub xml: String,
    pub etag: String,
    pub generated_at: DateTime<Utc>,
}

impl SitemapDocument {
    fn new(xml: String, generated_at: DateTime<Utc>) -> Self {
        let etag = format!("\"{:x}\"", Sha256::digest(xml.as_bytes()));
        Self {
            xml,
            etag,
            generated_at,
        }
    }
}

pub struct SitemapService {
    posts: Arc<dyn PostRepository>,
    pages: Arc<dyn PageRepository>,
    settings: Arc<SettingsService>,
    cache: Arc<Cache>,
    ttl: Duration,
}

impl SitemapService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        pages: Arc<dyn PageRepository>,
        settings: Arc<SettingsService>,
        cache: Arc<Cache>,
        ttl: Duration,
    ) -> Self {
        Self {
            posts,
            pages,
            settings,
            cache,
            ttl,
        }
    }

    /// Cached sitemap, rebuilding it on a miss
    pub async fn sitemap(&self) -> Result<SitemapDocument> {
        match self.cache.get::<SitemapDocument>(SITEMAP_CACHE_KEY).await {
            Ok(Some(document)) => {
                debug!("Sitemap cache hit");
                return Ok(document);
            }
            Ok(None) => debug!("Sitemap cache miss"),
            Err(e) => warn!("Sitemap cache read failed: {:#}", e),
        }

        let settings = self.settings.get().await;
        let now = Utc::now();
        let entries = self.build_entries(&settings, now).await?;
        let document = SitemapDocument::new(render_sitemap(settings.base_url(), &entries), now);

        if let Err(e) = self.cache.set(SITEMAP_CACHE_KEY, &document, self.ttl).await {
            warn!("Failed to cache sitemap: {:#}", e);
        }
        info!(entries = entries.len(), "Sitemap generated");
        Ok(document)
    }

    /// Clear the cached sitemap so the next read rebuilds it
    pub async fn regenerate(&self) {
        invalidate_sitemap(&self.cache).await;
    }

    /// Entries for the homepage, published pages, the blog index and live
    /// posts, honoring `no_index` and the excluded paths
    pub async fn build_entries(&self, settings: &SiteSettings, now: DateTime<Utc>) -> Result<Vec<SitemapEntry>> {
        let policy = &settings.sitemap;
        let excluded = |path: &str| policy.exclude_paths.iter().any(|p| p == path);
        let mut entries = Vec::new();

        if policy.include_pages {
            entries.push(SitemapEntry {
                path: "/".to_string(),
                last_modified: now,
                change_frequency: policy.change_frequency.homepage,
                priority: policy.priority.homepage,
            });

            let pages = self
                .pages
                .list(&PageFilter {
                    status: Some(PageStatus::Published),
                    ..Default::default()
                })
                .await?;
            for page in pages.into_iter().filter(|p| !p.seo.no_index) {
                let path = page.url_path();
                if excluded(&path) {
                    continue;
                }
                entries.push(SitemapEntry {
                    path,
                    last_modified: page.updated_at,
                    change_frequency: policy.change_frequency.pages,
                    priority: policy.priority.pages,
                });
            }
        }

        if policy.include_blog {
            entries.push(SitemapEntry {
                path: "/blog".to_string(),
                last_modified: now,
                change_frequency: ChangeFrequency::Daily,
                priority: BLOG_INDEX_PRIORITY,
            });

            let posts = self.posts.list_all(&PostFilter::live()).await?;
            for post in posts.into_iter().filter(|p| !p.seo.no_index) {
                let path = post.url_path();
                if excluded(&path) {
                    continue;
                }
                entries.push(SitemapEntry {
                    path,
                    last_modified: post.updated_at,
                    change_frequency: policy.change_frequency.blog,
                    priority: policy.priority.blog,
                });
            }
        }

        Ok(entries)
    }

    pub async fn robots(&self) -> String {
        render_robots(&self.settings.get().await)
    }
}

/// Render entries as a sitemaps.org URL set
pub fn render_sitemap(base_url: &str, entries: &[SitemapEntry]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for entry in entries {
        let _ = write!(
            xml,
            "  <url>\n    <loc>{}</loc>\n    <lastmod>{}</lastmod>\n    <changefreq>{}</changefreq>\n    <priority>{:.1}</priority>\n  </url>\n",
            xml_escape(&format!("{}{}", base_url, entry.path)),
            entry.last_modified.to_rfc3339_opts(SecondsFormat::Secs, true),
            entry.change_frequency.as_str(),
            entry.priority.clamp(0.0, 1.0),
        );
    }
    xml.push_str("</urlset>\n");
    xml
}

/// Render robots.txt directives from the crawler policy
pub fn render_robots(settings: &SiteSettings) -> String {
    let robots = &settings.robots;
    let mut out = String::new();

    if !robots.allow_indexing {
        out.push_str("User-agent: *\nDisallow: /\n");
    } else {
        out.push_str("User-agent: *\nAllow: /\n");
        for path in DISALLOWED_PATHS {
            let _ = writeln!(out, "Disallow: {}", path);
        }

        for rule in &robots.custom_rules {
            let agent = rule
                .user_agent
                .as_deref()
                .map(str::trim)
                .filter(|agent| !agent.is_empty())
                .unwrap_or("*");
            let _ = writeln!(out, "\nUser-agent: {}", agent);
            for path in &rule.allow {
                let _ = writeln!(out, "Allow: {}", path);
            }
            for path in &rule.disallow {
                let _ = writeln!(out, "Disallow: {}", path);
            }
            if let Some(delay) = rule.crawl_delay.filter(|d| *d > 0) {
                let _ = writeln!(out, "Crawl-delay: {}", delay);
            }
        }

        if let Some(extra) = robots.additional_directives.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let _ = writeln!(out, "\n{}", extra);
        }
    }

    let _ = writeln!(out, "\nSitemap: {}/sitemap.xml", settings.base_url());
    out
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{SqlxPageRepository, SqlxPostRepository, SqlxSettingsRepository};
    use crate::db::{create_test_pool, migrations, sqlite, DynDatabasePool};
    use crate::models::RobotsRule;
    use chrono::TimeZone;

    async fn setup(settings: SiteSettings) -> (DynDatabasePool, SitemapService, Arc<Cache>) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash) VALUES (1, 'u', 'u@example.com', 'h')",
        )
        .execute(sqlite(&pool).unwrap())
        .await
        .unwrap();

        let cache = Arc::new(MemoryCache::new());
        let settings = Arc::new(SettingsService::with_settings(
            SqlxSettingsRepository::boxed(pool.clone()),
            cache.clone(),
            settings,
        ));
        let service = SitemapService::new(
            SqlxPostRepository::boxed(pool.clone()),
            SqlxPageRepository::boxed(pool.clone()),
            settings,
            cache.clone(),
            Duration::from_secs(3600),
        );
        (pool, service, cache)
    }

    async fn insert_post(pool: &DynDatabasePool, slug: &str, status: &str, seo: &str) {
        sqlx::query(
            "INSERT INTO posts (title, slug, content, content_html, author_id, status, published_at, seo, created_at, updated_at) \
             VALUES (?, ?, 'body', '<p>body</p>', 1, ?, ?, ?, ?, ?)",
        )
        .bind(slug)
        .bind(slug)
        .bind(status)
        .bind(Utc::now() - chrono::Duration::days(1))
        .bind(seo)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(sqlite(pool).unwrap())
        .await
        .unwrap();
    }

    async fn insert_page(pool: &DynDatabasePool, slug: &str, status: &str) {
        sqlx::query(
            "INSERT INTO pages (title, slug, status, created_by, created_at, updated_at) VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(slug)
        .bind(slug)
        .bind(status)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(sqlite(pool).unwrap())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_sitemap_includes_only_public_content() {
        let mut settings = SiteSettings::default();
        settings.sitemap.exclude_paths = vec!["/private".to_string()];
        let (pool, service, _cache) = setup(settings).await;

        insert_post(&pool, "visible", "published", "{}").await;
        insert_post(&pool, "hidden", "published", r#"{"no_index": true}"#).await;
        insert_post(&pool, "draft", "draft", "{}").await;
        insert_page(&pool, "about", "published").await;
        insert_page(&pool, "private", "published").await;
        insert_page(&pool, "wip", "draft").await;

        let document = service.sitemap().await.unwrap();
        assert!(document.xml.contains("<loc>https://beekmanstrategic.com/</loc>"));
        assert!(document.xml.contains("<loc>https://beekmanstrategic.com/about</loc>"));
        assert!(document.xml.contains("<loc>https://beekmanstrategic.com/blog</loc>"));
        assert!(document.xml.contains("<loc>https://beekmanstrategic.com/blog/visible</loc>"));
        assert!(!document.xml.contains("/blog/hidden"));
        assert!(!document.xml.contains("/blog/draft"));
        assert!(!document.xml.contains("/private"));
        assert!(!document.xml.contains("/wip"));
        assert!(document.xml.contains("<priority>0.7</priority>"));
        assert!(document.xml.contains("<priority>0.9</priority>"));
    }

    #[tokio::test]
    async fn test_sitemap_is_cached_until_regenerated() {
        let (pool, service, _cache) = setup(SiteSettings::default()).await;
        let first = service.sitemap().await.unwrap();

        insert_post(&pool, "late", "published", "{}").await;
        let cached = service.sitemap().await.unwrap();
        assert_eq!(cached.etag, first.etag);
        assert!(!cached.xml.contains("/blog/late"));

        service.regenerate().await;
        let rebuilt = service.sitemap().await.unwrap();
        assert!(rebuilt.xml.contains("/blog/late"));
        assert_ne!(rebuilt.etag, first.etag);
    }

    #[tokio::test]
    async fn test_sections_can_be_disabled() {
        let mut settings = SiteSettings::default();
        settings.sitemap.include_pages = false;
        let (_pool, service, _cache) = setup(settings.clone()).await;

        let entries = service.build_entries(&settings, Utc::now()).await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/blog"]);
    }

    #[test]
    fn test_render_sitemap_format() {
        let entries = vec![SitemapEntry {
            path: "/blog/a&b".to_string(),
            last_modified: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            change_frequency: ChangeFrequency::Weekly,
            priority: 0.8,
        }];
        let xml = render_sitemap("https://example.com", &entries);
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<loc>https://example.com/blog/a&amp;b</loc>"));
        assert!(xml.contains("<lastmod>2024-03-01T12:00:00Z</lastmod>"));
        assert!(xml.contains("<changefreq>weekly</changefreq>"));
        assert!(xml.contains("<priority>0.8</priority>"));
        assert!(xml.trim_end().ends_with("</urlset>"));
    }

    #[test]
    fn test_robots_blocks_everything_when_indexing_disabled() {
        let mut settings = SiteSettings::default();
        settings.robots.allow_indexing = false;
        assert_eq!(
            render_robots(&settings),
            "User-agent: *\nDisallow: /\n\nSitemap: https://beekmanstrategic.com/sitemap.xml\n"
        );
    }

    #[test]
    fn test_robots_with_custom_rules() {
        let mut settings = SiteSettings::default();
        settings.site_url = "https://example.com/".to_string();
        settings.robots.custom_rules = vec![RobotsRule {
            user_agent: Some("BadBot".to_string()),
            allow: vec![],
            disallow: vec!["/".to_string()],
            crawl_delay: Some(10),
        }];
        settings.robots.additional_directives = Some("Host: example.com".to_string());

        let robots = render_robots(&settings);
        assert_eq!(
            robots,
            "User-agent: *\nAllow: /\nDisallow: /admin/\nDisallow: /api/\nDisallow: /uploads/\n\
             \nUser-agent: BadBot\nDisallow: /\nCrawl-delay: 10\n\
             \nHost: example.com\n\
             \nSitemap: https://example.com/sitemap.xml\n"
        );
    }
}
