//! Blog post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::content::{FeaturedImage, Language, SeoMeta};

pub const EXCERPT_MAX: usize = 500;

/// Blog post entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    /// Markdown source
    pub content: String,
    /// Rendered from `content` on every content change
    pub content_html: String,
    pub featured_image: Option<FeaturedImage>,
    pub category: PostCategory,
    pub tags: Vec<String>,
    pub author_id: i64,
    pub status: PostStatus,
    /// Set the first time the post is published, never cleared
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub seo: SeoMeta,
    pub views: i64,
    /// Minutes, `ceil(words / 200)`
    pub read_time: i64,
    pub language: Language,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BlogPost {
    /// Public visibility: published with a publish time that has passed
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == PostStatus::Published && self.published_at.is_some_and(|at| at <= now)
    }

    pub fn url_path(&self) -> String {
        format!("/blog/{}", self.slug)
    }
}

/// Blog post lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    Scheduled,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            "scheduled" => Ok(PostStatus::Scheduled),
            "archived" => Ok(PostStatus::Archived),
            _ => Err(anyhow::anyhow!("Invalid post status: {}", s)),
        }
    }
}

/// Blog post category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostCategory {
    #[default]
    Insights,
    MarketAnalysis,
    WealthManagement,
    InvestmentBanking,
    CompanyNews,
    PressRelease,
}

impl PostCategory {
    pub const ALL: [PostCategory; 6] = [
        PostCategory::Insights,
        PostCategory::MarketAnalysis,
        PostCategory::WealthManagement,
        PostCategory::InvestmentBanking,
        PostCategory::CompanyNews,
        PostCategory::PressRelease,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PostCategory::Insights => "insights",
            PostCategory::MarketAnalysis => "market-analysis",
            PostCategory::WealthManagement => "wealth-management",
            PostCategory::InvestmentBanking => "investment-banking",
            PostCategory::CompanyNews => "company-news",
            PostCategory::PressRelease => "press-release",
        }
    }
}

impl fmt::Display for PostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        PostCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == lowered)
            .ok_or_else(|| anyhow::anyhow!("Invalid post category: {}", s))
    }
}

/// Input for creating a blog post
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub content: String,
    #[serde(default)]
    pub featured_image: Option<FeaturedImage>,
    #[serde(default)]
    pub category: Option<PostCategory>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: Option<PostStatus>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub seo: Option<SeoMeta>,
    #[serde(default)]
    pub language: Option<Language>,
}

impl CreatePostInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Partial update for a blog post; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub featured_image: Option<FeaturedImage>,
    pub category: Option<PostCategory>,
    pub tags: Option<Vec<String>>,
    pub status: Option<PostStatus>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub seo: Option<SeoMeta>,
    pub language: Option<Language>,
}

/// Filters for listing posts
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    /// Restrict to published posts whose publish time has passed
    pub live_only: bool,
    pub category: Option<PostCategory>,
    pub language: Option<Language>,
    pub author_id: Option<i64>,
    pub tag: Option<String>,
    /// Case-insensitive substring match on title, excerpt or content
    pub search: Option<String>,
}

impl PostFilter {
    /// Filter used for anonymous readers
    pub fn live() -> Self {
        Self {
            live_only: true,
            ..Default::default()
        }
    }
}

/// Published post count per category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: PostCategory,
    pub count: i64,
}

/// Published post count per tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_category_serde_uses_kebab_case() {
        let json = serde_json::to_string(&PostCategory::MarketAnalysis).unwrap();
        assert_eq!(json, "\"market-analysis\"");
        let parsed: PostCategory = serde_json::from_str("\"press-release\"").unwrap();
        assert_eq!(parsed, PostCategory::PressRelease);
        assert!(serde_json::from_str::<PostCategory>("\"gossip\"").is_err());
    }

    #[test]
    fn test_category_from_str_matches_as_str() {
        for category in PostCategory::ALL {
            assert_eq!(category.as_str().parse::<PostCategory>().unwrap(), category);
        }
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Published".parse::<PostStatus>().unwrap(), PostStatus::Published);
        assert!("live".parse::<PostStatus>().is_err());
    }

    #[test]
    fn test_update_input_absent_fields_are_none() {
        let input: UpdatePostInput = serde_json::from_str(r#"{"status":"archived"}"#).unwrap();
        assert_eq!(input.status, Some(PostStatus::Archived));
        assert!(input.content.is_none());
        assert!(input.tags.is_none());
    }

    #[test]
    fn test_is_live() {
        let now = Utc::now();
        let mut post = BlogPost {
            id: 1,
            title: "t".to_string(),
            slug: "t".to_string(),
            excerpt: None,
            content: String::new(),
            content_html: String::new(),
            featured_image: None,
            category: PostCategory::default(),
            tags: vec![],
            author_id: 1,
            status: PostStatus::Published,
            published_at: Some(now - Duration::minutes(1)),
            scheduled_at: None,
            seo: SeoMeta::default(),
            views: 0,
            read_time: 0,
            language: Language::En,
            created_at: now,
            updated_at: now,
        };
        assert!(post.is_live(now));

        post.published_at = Some(now + Duration::hours(1));
        assert!(!post.is_live(now));

        post.published_at = Some(now - Duration::hours(1));
        post.status = PostStatus::Archived;
        assert!(!post.is_live(now));
        assert_eq!(post.url_path(), "/blog/t");
    }
}
