//! Site-wide settings document
//!
//! A single `SiteSettings` value holds identity, default meta tags, crawler
//! policy, sitemap policy and the ordered redirect list. Every section
//! deserializes with defaults so partially-filled documents are accepted.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub site_name: String,
    pub site_url: String,
    pub default_meta_title: String,
    pub default_meta_description: String,
    pub title_separator: String,
    pub social: SocialSettings,
    pub verification: VerificationSettings,
    pub analytics: AnalyticsIds,
    pub robots: RobotsSettings,
    pub sitemap: SitemapSettings,
    pub structured_data: StructuredDataSettings,
    pub redirects: Vec<Redirect>,
    pub custom_scripts: CustomScripts,
    pub performance: PerformanceSettings,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: "Beekman Strategic".to_string(),
            site_url: "https://beekmanstrategic.com".to_string(),
            default_meta_title: "Beekman Strategic | Boutique Financial Advisory".to_string(),
            default_meta_description: "Beekman Strategic is a boutique financial advisory and investment banking firm serving the global elite with personalized wealth management solutions.".to_string(),
            title_separator: " | ".to_string(),
            social: SocialSettings::default(),
            verification: VerificationSettings::default(),
            analytics: AnalyticsIds::default(),
            robots: RobotsSettings::default(),
            sitemap: SitemapSettings::default(),
            structured_data: StructuredDataSettings::default(),
            redirects: Vec::new(),
            custom_scripts: CustomScripts::default(),
            performance: PerformanceSettings::default(),
        }
    }
}

impl SiteSettings {
    /// Site URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }

    /// Subset that anonymous callers may read
    pub fn public_view(&self) -> PublicSettings {
        PublicSettings {
            site_name: self.site_name.clone(),
            site_url: self.site_url.clone(),
            default_meta_title: self.default_meta_title.clone(),
            default_meta_description: self.default_meta_description.clone(),
            social: self.social.clone(),
            structured_data: self.structured_data.clone(),
        }
    }
}

/// Publicly readable slice of the settings document
#[derive(Debug, Clone, Serialize)]
pub struct PublicSettings {
    pub site_name: String,
    pub site_url: String,
    pub default_meta_title: String,
    pub default_meta_description: String,
    pub social: SocialSettings,
    pub structured_data: StructuredDataSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialSettings {
    pub og_default_image: Option<String>,
    pub twitter_handle: Option<String>,
    pub facebook_app_id: Option<String>,
    pub linkedin_company: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub google_site_verification: Option<String>,
    pub bing_site_verification: Option<String>,
    pub yandex_verification: Option<String>,
    pub pinterest_verification: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsIds {
    pub google_analytics_id: Option<String>,
    pub ga4_measurement_id: Option<String>,
    pub google_tag_manager_id: Option<String>,
    pub facebook_pixel_id: Option<String>,
    pub linkedin_insight_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotsSettings {
    pub allow_indexing: bool,
    pub custom_rules: Vec<RobotsRule>,
    pub additional_directives: Option<String>,
}

impl Default for RobotsSettings {
    fn default() -> Self {
        Self {
            allow_indexing: true,
            custom_rules: Vec::new(),
            additional_directives: None,
        }
    }
}

/// Crawler rule for one user agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotsRule {
    pub user_agent: Option<String>,
    pub allow: Vec<String>,
    pub disallow: Vec<String>,
    pub crawl_delay: Option<u32>,
}

/// Sitemap change-frequency token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFrequency {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl ChangeFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeFrequency::Always => "always",
            ChangeFrequency::Hourly => "hourly",
            ChangeFrequency::Daily => "daily",
            ChangeFrequency::Weekly => "weekly",
            ChangeFrequency::Monthly => "monthly",
            ChangeFrequency::Yearly => "yearly",
            ChangeFrequency::Never => "never",
        }
    }
}

impl fmt::Display for ChangeFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SitemapSettings {
    pub include_pages: bool,
    pub include_blog: bool,
    pub change_frequency: ChangeFrequencies,
    pub priority: Priorities,
    /// Paths such as `/privacy` that never appear in the sitemap
    pub exclude_paths: Vec<String>,
}

impl Default for SitemapSettings {
    fn default() -> Self {
        Self {
            include_pages: true,
            include_blog: true,
            change_frequency: ChangeFrequencies::default(),
            priority: Priorities::default(),
            exclude_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeFrequencies {
    pub homepage: ChangeFrequency,
    pub pages: ChangeFrequency,
    pub blog: ChangeFrequency,
}

impl Default for ChangeFrequencies {
    fn default() -> Self {
        Self {
            homepage: ChangeFrequency::Daily,
            pages: ChangeFrequency::Weekly,
            blog: ChangeFrequency::Weekly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Priorities {
    pub homepage: f32,
    pub pages: f32,
    pub blog: f32,
}

impl Default for Priorities {
    fn default() -> Self {
        Self {
            homepage: 1.0,
            pages: 0.8,
            blog: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredDataSettings {
    pub organization: Organization,
    pub breadcrumbs_enabled: bool,
}

impl Default for StructuredDataSettings {
    fn default() -> Self {
        Self {
            organization: Organization::default(),
            breadcrumbs_enabled: true,
        }
    }
}

/// schema.org organization block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Organization {
    #[serde(rename = "type")]
    pub org_type: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub logo: Option<String>,
    pub address: PostalAddress,
    pub contact_points: Vec<ContactPoint>,
    pub same_as: Vec<String>,
}

impl Default for Organization {
    fn default() -> Self {
        Self {
            org_type: "FinancialService".to_string(),
            name: None,
            description: None,
            url: None,
            logo: None,
            address: PostalAddress::default(),
            contact_points: Vec::new(),
            same_as: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostalAddress {
    pub street_address: Option<String>,
    pub address_locality: Option<String>,
    pub address_region: Option<String>,
    pub postal_code: Option<String>,
    pub address_country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactPoint {
    pub contact_type: Option<String>,
    pub telephone: Option<String>,
    pub email: Option<String>,
    pub area_served: Option<String>,
}

/// HTTP status used for a redirect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum RedirectCode {
    #[default]
    Permanent,
    Temporary,
}

impl RedirectCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            RedirectCode::Permanent => 301,
            RedirectCode::Temporary => 302,
        }
    }
}

impl TryFrom<u16> for RedirectCode {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            301 => Ok(RedirectCode::Permanent),
            302 => Ok(RedirectCode::Temporary),
            other => Err(format!("Unsupported redirect status code: {}", other)),
        }
    }
}

impl From<RedirectCode> for u16 {
    fn from(code: RedirectCode) -> Self {
        code.as_u16()
    }
}

/// A source to destination rewrite rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redirect {
    /// Stable identity, independent of list position
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub status_code: RedirectCode,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Input for adding a redirect
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRedirectInput {
    pub source: String,
    pub destination: String,
    #[serde(default, alias = "type")]
    pub status_code: RedirectCode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomScripts {
    pub head_start: Option<String>,
    pub head_end: Option<String>,
    pub body_start: Option<String>,
    pub body_end: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    pub enable_preconnect: bool,
    pub preconnect_urls: Vec<String>,
    pub enable_dns_prefetch: bool,
    pub dns_prefetch_urls: Vec<String>,
}
