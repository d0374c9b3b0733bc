//! Page model
//!
//! Pages form a tree through `parent_id` and carry an ordered list of typed
//! content blocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use super::content::{Language, SeoMeta};

/// Page entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub template: PageTemplate,
    pub status: PageStatus,
    /// Free text body, used by the SEO analyzer when present
    pub content: Option<String>,
    /// Sorted by `order`
    pub content_blocks: Vec<ContentBlock>,
    pub parent_id: Option<i64>,
    pub order: i64,
    pub show_in_nav: bool,
    pub show_in_footer: bool,
    pub seo: SeoMeta,
    pub language: Language,
    pub created_by: i64,
    pub updated_by: Option<i64>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn url_path(&self) -> String {
        format!("/{}", self.slug)
    }
}

/// Page lifecycle status (pages cannot be scheduled)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Draft => "draft",
            PageStatus::Published => "published",
            PageStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(PageStatus::Draft),
            "published" => Ok(PageStatus::Published),
            "archived" => Ok(PageStatus::Archived),
            _ => Err(anyhow::anyhow!("Invalid page status: {}", s)),
        }
    }
}

/// Page layout template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageTemplate {
    #[default]
    Default,
    Landing,
    About,
    Services,
    Contact,
    BlogList,
    Custom,
}

impl PageTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageTemplate::Default => "default",
            PageTemplate::Landing => "landing",
            PageTemplate::About => "about",
            PageTemplate::Services => "services",
            PageTemplate::Contact => "contact",
            PageTemplate::BlogList => "blog-list",
            PageTemplate::Custom => "custom",
        }
    }
}

impl FromStr for PageTemplate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(PageTemplate::Default),
            "landing" => Ok(PageTemplate::Landing),
            "about" => Ok(PageTemplate::About),
            "services" => Ok(PageTemplate::Services),
            "contact" => Ok(PageTemplate::Contact),
            "blog-list" => Ok(PageTemplate::BlogList),
            "custom" => Ok(PageTemplate::Custom),
            _ => Err(anyhow::anyhow!("Invalid page template: {}", s)),
        }
    }
}

/// Content block kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Hero,
    Text,
    Image,
    Gallery,
    Cta,
    Testimonial,
    Stats,
    Services,
    Team,
    Contact,
    Custom,
}

/// A typed, positioned block of page content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Assigned on save when missing
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

fn default_show_in_nav() -> bool {
    true
}

/// Input for creating a page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePageInput {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub template: Option<PageTemplate>,
    #[serde(default)]
    pub status: Option<PageStatus>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_blocks: Vec<ContentBlock>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub order: i64,
    #[serde(default = "default_show_in_nav")]
    pub show_in_nav: bool,
    #[serde(default)]
    pub show_in_footer: bool,
    #[serde(default)]
    pub seo: Option<SeoMeta>,
    #[serde(default)]
    pub language: Option<Language>,
}

impl CreatePageInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            show_in_nav: true,
            ..Default::default()
        }
    }
}

/// Partial update for a page.
///
/// `parent_id` distinguishes "absent" (`None`) from "move to root"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdatePageInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub template: Option<PageTemplate>,
    pub status: Option<PageStatus>,
    pub content: Option<String>,
    pub content_blocks: Option<Vec<ContentBlock>>,
    #[serde(deserialize_with = "double_option")]
    pub parent_id: Option<Option<i64>>,
    pub order: Option<i64>,
    pub show_in_nav: Option<bool>,
    pub show_in_footer: Option<bool>,
    pub seo: Option<SeoMeta>,
    pub language: Option<Language>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Filters for listing pages
#[derive(Debug, Clone, Default)]
pub struct PageFilter {
    pub status: Option<PageStatus>,
    pub template: Option<PageTemplate>,
    pub language: Option<Language>,
    /// `Some(None)` selects root pages
    pub parent_id: Option<Option<i64>>,
}

/// One entry of a reorder request
#[derive(Debug, Clone, Deserialize)]
pub struct PageOrderItem {
    pub id: i64,
    pub order: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

/// Navigation tree node
#[derive(Debug, Clone, Serialize)]
pub struct NavNode {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub url: String,
    pub order: i64,
    pub children: Vec<NavNode>,
}
