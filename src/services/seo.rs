//! SEO analysis
//!
//! `analyze` inspects one post or page and sorts every check into issues,
//! warnings, suggestions or passed. `audit` runs the same rules over all
//! published content plus a few site-wide checks. Neither ever fails on
//! incomplete content: a missing field is a failed check.

use crate::db::repositories::{PageRepository, PostRepository};
use crate::models::{
    BlogPost, ContentKind, ContentRef, Page, PageFilter, PageStatus, PostFilter, PostStatus,
    SeoMeta, SiteSettings,
};
use crate::services::settings::SettingsService;
use crate::services::validation::word_count;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Score when no check produced an issue, warning or pass
pub const NEUTRAL_SCORE: u8 = 50;

const META_TITLE_RANGE: (usize, usize) = (30, 60);
const META_DESCRIPTION_RANGE: (usize, usize) = (70, 160);
const MIN_WORDS: usize = 300;
const GOOD_WORDS: usize = 1000;
const MIN_DEFAULT_DESCRIPTION: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum SeoServiceError {
    #[error("Content not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Field a finding is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeoField {
    MetaTitle,
    MetaDescription,
    FocusKeyword,
    Content,
    FeaturedImage,
}

/// An issue or warning
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub field: SeoField,
    pub message: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub field: SeoField,
    pub message: &'static str,
}

/// Result of analyzing a single item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeoAnalysis {
    pub score: u8,
    pub issues: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub suggestions: Vec<Suggestion>,
    pub passed: Vec<&'static str>,
}

/// What the analyzer reads from an item
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    pub kind: ContentKind,
    pub title: &'a str,
    pub seo: &'a SeoMeta,
    pub body: Option<&'a str>,
    /// `Some(has_alt)` for posts; pages carry no featured image
    pub featured_image_alt: Option<bool>,
}

impl<'a> AnalysisInput<'a> {
    pub fn post(post: &'a BlogPost) -> Self {
        Self {
            kind: ContentKind::Blog,
            title: &post.title,
            seo: &post.seo,
            body: Some(&post.content),
            featured_image_alt: Some(post.featured_image.as_ref().is_some_and(|image| image.has_alt())),
        }
    }

    pub fn page(page: &'a Page) -> Self {
        Self {
            kind: ContentKind::Page,
            title: &page.title,
            seo: &page.seo,
            body: page.content.as_deref(),
            featured_image_alt: None,
        }
    }
}

/// `clamp(70 - 20i - 5w + 10p, 0, 100)`, or the neutral score when there
/// is nothing to count
pub fn calculate_score(issues: usize, warnings: usize, passed: usize) -> u8 {
    if issues + warnings + passed == 0 {
        return NEUTRAL_SCORE;
    }
    let score = 70 - 20 * issues as i64 - 5 * warnings as i64 + 10 * passed as i64;
    score.clamp(0, 100) as u8
}

fn warning(field: SeoField, message: &'static str) -> Finding {
    Finding {
        severity: Severity::Warning,
        field,
        message,
    }
}

fn error(field: SeoField, message: &'static str) -> Finding {
    Finding {
        severity: Severity::Error,
        field,
        message,
    }
}

/// Run every rule against one item
pub fn analyze(input: AnalysisInput<'_>) -> SeoAnalysis {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();
    let mut suggestions = Vec::new();
    let mut passed = Vec::new();
    let seo = input.seo;

    match seo.meta_title().map(|t| t.chars().count()) {
        None => issues.push(error(SeoField::MetaTitle, "Meta title is missing")),
        Some(len) if len < META_TITLE_RANGE.0 => warnings.push(warning(
            SeoField::MetaTitle,
            "Meta title is too short (< 30 chars)",
        )),
        Some(len) if len > META_TITLE_RANGE.1 => warnings.push(warning(
            SeoField::MetaTitle,
            "Meta title is too long (> 60 chars)",
        )),
        Some(_) => passed.push("Meta title length is optimal"),
    }

    match seo.meta_description().map(|d| d.chars().count()) {
        None => issues.push(error(SeoField::MetaDescription, "Meta description is missing")),
        Some(len) if len < META_DESCRIPTION_RANGE.0 => warnings.push(warning(
            SeoField::MetaDescription,
            "Meta description is too short (< 70 chars)",
        )),
        Some(len) if len > META_DESCRIPTION_RANGE.1 => warnings.push(warning(
            SeoField::MetaDescription,
            "Meta description is too long (> 160 chars)",
        )),
        Some(_) => passed.push("Meta description length is optimal"),
    }

    match seo.focus_keyword() {
        None => warnings.push(warning(SeoField::FocusKeyword, "No focus keyword set")),
        Some(keyword) => {
            let keyword = keyword.to_lowercase();
            if !input.title.to_lowercase().contains(&keyword) {
                suggestions.push(Suggestion {
                    field: SeoField::FocusKeyword,
                    message: "Focus keyword not found in title",
                });
            }
            if let Some(description) = seo.meta_description() {
                if !description.to_lowercase().contains(&keyword) {
                    suggestions.push(Suggestion {
                        field: SeoField::FocusKeyword,
                        message: "Focus keyword not found in meta description",
                    });
                }
            }
        }
    }

    if input.kind == ContentKind::Blog {
        if let Some(body) = input.body.filter(|b| !b.is_empty()) {
            let words = word_count(body);
            if words < MIN_WORDS {
                warnings.push(warning(SeoField::Content, "Content is too short (< 300 words)"));
            } else if words >= GOOD_WORDS {
                passed.push("Content has good length (1000+ words)");
            }
        }
        if input.featured_image_alt == Some(false) {
            warnings.push(warning(SeoField::FeaturedImage, "Featured image missing alt text"));
        }
    }

    SeoAnalysis {
        score: calculate_score(issues.len(), warnings.len(), passed.len()),
        issues,
        warnings,
        suggestions,
        passed,
    }
}

/// Where an audit finding came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FindingSource {
    Global {
        #[serde(rename = "type")]
        scope: &'static str,
    },
    Content {
        content: ContentRef,
    },
}

impl FindingSource {
    fn global() -> Self {
        FindingSource::Global { scope: "global" }
    }
}

/// A finding tagged with its origin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditFinding {
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<SeoField>,
    pub message: &'static str,
    #[serde(flatten)]
    pub source: FindingSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditSummary {
    pub total_content: usize,
    pub issues: usize,
    pub warnings: usize,
    pub passed: usize,
}

/// Site-wide audit result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteAudit {
    pub score: u8,
    pub summary: AuditSummary,
    pub issues: Vec<AuditFinding>,
    pub warnings: Vec<AuditFinding>,
    pub passed: Vec<&'static str>,
}

/// Combine global checks with per-item findings.
///
/// Only issues and warnings of individual items are carried over; their
/// passed checks and suggestions are not part of the site score.
pub fn audit_site(settings: &SiteSettings, posts: &[BlogPost], pages: &[Page]) -> SiteAudit {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();
    let mut passed = Vec::new();

    let global = |severity, message| AuditFinding {
        severity,
        field: None,
        message,
        source: FindingSource::global(),
    };

    if settings.default_meta_description.trim().chars().count() < MIN_DEFAULT_DESCRIPTION {
        issues.push(global(
            Severity::Error,
            "Default meta description is missing or too short",
        ));
    } else {
        passed.push("Default meta description is set");
    }

    if is_blank(settings.social.og_default_image.as_deref()) {
        warnings.push(global(Severity::Warning, "No default Open Graph image set"));
    }

    if is_blank(settings.verification.google_site_verification.as_deref()) {
        warnings.push(global(Severity::Warning, "Google Search Console not verified"));
    }

    let items = posts
        .iter()
        .map(|post| (AnalysisInput::post(post), content_ref(ContentKind::Blog, post.id, &post.title, &post.slug)))
        .chain(
            pages
                .iter()
                .map(|page| (AnalysisInput::page(page), content_ref(ContentKind::Page, page.id, &page.title, &page.slug))),
        );

    for (input, content) in items {
        let analysis = analyze(input);
        let tag = |finding: Finding| AuditFinding {
            severity: finding.severity,
            field: Some(finding.field),
            message: finding.message,
            source: FindingSource::Content {
                content: content.clone(),
            },
        };
        issues.extend(analysis.issues.into_iter().map(&tag));
        warnings.extend(analysis.warnings.into_iter().map(&tag));
    }

    SiteAudit {
        score: calculate_score(issues.len(), warnings.len(), passed.len()),
        summary: AuditSummary {
            total_content: posts.len() + pages.len(),
            issues: issues.len(),
            warnings: warnings.len(),
            passed: passed.len(),
        },
        issues,
        warnings,
        passed,
    }
}

fn content_ref(kind: ContentKind, id: i64, title: &str, slug: &str) -> ContentRef {
    ContentRef {
        kind,
        id,
        title: title.to_string(),
        slug: slug.to_string(),
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Loads content for the analyzer and auditor
pub struct SeoService {
    posts: Arc<dyn PostRepository>,
    pages: Arc<dyn PageRepository>,
    settings: Arc<SettingsService>,
}

impl SeoService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        pages: Arc<dyn PageRepository>,
        settings: Arc<SettingsService>,
    ) -> Self {
        Self { posts, pages, settings }
    }

    /// Analyze one post or page by id
    pub async fn analyze(&self, kind: ContentKind, id: i64) -> Result<SeoAnalysis, SeoServiceError> {
        match kind {
            ContentKind::Blog => {
                let post = self.posts.get_by_id(id).await?.ok_or(SeoServiceError::NotFound)?;
                Ok(analyze(AnalysisInput::post(&post)))
            }
            ContentKind::Page => {
                let page = self.pages.get_by_id(id).await?.ok_or(SeoServiceError::NotFound)?;
                Ok(analyze(AnalysisInput::page(&page)))
            }
        }
    }

    /// Audit every published post and page
    pub async fn audit(&self) -> Result<SiteAudit, SeoServiceError> {
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
        let settings = self.settings.get().await;

        let audit = audit_site(&settings, &posts, &pages);
        info!(
            score = audit.score,
            issues = audit.summary.issues,
            warnings = audit.summary.warnings,
            "SEO audit completed"
        );
        Ok(audit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeaturedImage, Language, PageTemplate, PostCategory};
    use chrono::Utc;
    use proptest::prelude::*;

    fn words(n: usize) -> String {
        vec!["tax"; n].join(" ")
    }

    fn post(title: &str, content: String, seo: SeoMeta) -> BlogPost {
        BlogPost {
            id: 7,
            title: title.to_string(),
            slug: "post".to_string(),
            excerpt: None,
            content_html: String::new(),
            content,
            featured_image: None,
            category: PostCategory::Insights,
            tags: Vec::new(),
            author_id: 1,
            status: PostStatus::Published,
            published_at: Some(Utc::now()),
            scheduled_at: None,
            seo,
            views: 0,
            read_time: 0,
            language: Language::En,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn page(seo: SeoMeta) -> Page {
        Page {
            id: 3,
            title: "About".to_string(),
            slug: "about".to_string(),
            template: PageTemplate::About,
            status: PageStatus::Published,
            content: None,
            content_blocks: Vec::new(),
            parent_id: None,
            order: 0,
            show_in_nav: true,
            show_in_footer: false,
            seo,
            language: Language::En,
            created_by: 1,
            updated_by: None,
            published_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn messages(findings: &[Finding]) -> Vec<&'static str> {
        findings.iter().map(|f| f.message).collect()
    }

    #[test]
    fn test_post_without_seo_block() {
        let mut item = post("Tax Planning 2024", words(350), SeoMeta::default());
        item.featured_image = Some(FeaturedImage {
            url: "/uploads/a.png".to_string(),
            alt: Some("Skyline".to_string()),
            caption: None,
        });
        let analysis = analyze(AnalysisInput::post(&item));

        assert_eq!(
            messages(&analysis.issues),
            vec!["Meta title is missing", "Meta description is missing"]
        );
        assert_eq!(messages(&analysis.warnings), vec!["No focus keyword set"]);
        assert!(analysis.passed.is_empty());
        assert_eq!(analysis.score, 25);
    }

    #[test]
    fn test_short_post_without_image_alt_scores_twenty() {
        // 2 issues and 2 warnings: 70 - 40 - 10
        let mut item = post("Tax Planning 2024", words(350), SeoMeta::default());
        item.featured_image = Some(FeaturedImage {
            url: "/uploads/a.png".to_string(),
            ..Default::default()
        });
        let analysis = analyze(AnalysisInput::post(&item));
        assert_eq!(analysis.issues.len(), 2);
        assert_eq!(
            messages(&analysis.warnings),
            vec!["No focus keyword set", "Featured image missing alt text"]
        );
        assert_eq!(analysis.score, 20);

        let short = post("Tax Planning 2024", words(120), SeoMeta::default());
        let analysis = analyze(AnalysisInput::post(&short));
        assert_eq!(
            messages(&analysis.warnings),
            vec!["No focus keyword set", "Content is too short (< 300 words)", "Featured image missing alt text"]
        );
    }

    #[test]
    fn test_well_optimized_post() {
        let seo = SeoMeta {
            meta_title: Some("Tax Planning Strategies for Global Families".to_string()),
            meta_description: Some(
                "A practical overview of cross-border tax planning for families with assets in several jurisdictions."
                    .to_string(),
            ),
            focus_keyword: Some("Tax Planning".to_string()),
            ..Default::default()
        };
        let mut item = post("Tax Planning for 2024", words(1200), seo);
        item.featured_image = Some(FeaturedImage {
            url: "/uploads/a.png".to_string(),
            alt: Some("Chart".to_string()),
            caption: None,
        });
        let analysis = analyze(AnalysisInput::post(&item));

        assert!(analysis.issues.is_empty());
        assert!(analysis.warnings.is_empty());
        assert!(analysis.suggestions.is_empty());
        assert_eq!(analysis.passed.len(), 3);
        assert_eq!(analysis.score, 100);
    }

    #[test]
    fn test_keyword_suggestions_and_length_warnings() {
        let seo = SeoMeta {
            meta_title: Some("Too short".to_string()),
            meta_description: Some("d".repeat(161)),
            focus_keyword: Some("estate".to_string()),
            ..Default::default()
        };
        let analysis = analyze(AnalysisInput::page(&page(seo)));

        assert!(analysis.issues.is_empty());
        assert_eq!(
            messages(&analysis.warnings),
            vec!["Meta title is too short (< 30 chars)", "Meta description is too long (> 160 chars)"]
        );
        let suggestions: Vec<&str> = analysis.suggestions.iter().map(|s| s.message).collect();
        assert_eq!(
            suggestions,
            vec!["Focus keyword not found in title", "Focus keyword not found in meta description"]
        );
        assert_eq!(analysis.score, 60);
    }

    #[test]
    fn test_pages_skip_content_and_image_checks() {
        let mut item = page(SeoMeta::default());
        item.content = Some("short".to_string());
        let analysis = analyze(AnalysisInput::page(&item));
        assert_eq!(messages(&analysis.warnings), vec!["No focus keyword set"]);
    }

    #[test]
    fn test_score_formula() {
        assert_eq!(calculate_score(0, 0, 0), NEUTRAL_SCORE);
        assert_eq!(calculate_score(2, 2, 0), 20);
        assert_eq!(calculate_score(0, 0, 3), 100);
        assert_eq!(calculate_score(5, 0, 0), 0);
        assert_eq!(calculate_score(0, 1, 0), 65);
    }

    #[test]
    fn test_audit_tags_findings_and_globals() {
        let settings = SiteSettings::default();
        let seo = SeoMeta {
            meta_title: Some("About Beekman Strategic Advisory Team".to_string()),
            meta_description: Some(
                "Meet the advisors behind a boutique firm serving families and founders worldwide."
                    .to_string(),
            ),
            focus_keyword: Some("advisory".to_string()),
            ..Default::default()
        };
        let audit = audit_site(&settings, &[post("Untitled", words(10), SeoMeta::default())], &[page(seo)]);

        assert_eq!(audit.summary.total_content, 2);
        assert_eq!(audit.passed, vec!["Default meta description is set"]);
        assert_eq!(audit.issues.len(), 2);
        assert!(audit
            .issues
            .iter()
            .all(|f| matches!(&f.source, FindingSource::Content { content } if content.kind == ContentKind::Blog)));

        let global: Vec<&str> = audit
            .warnings
            .iter()
            .filter(|f| f.source == FindingSource::global())
            .map(|f| f.message)
            .collect();
        assert_eq!(global, vec!["No default Open Graph image set", "Google Search Console not verified"]);

        // globals: 2 warnings; post: keyword, short content, image alt; page: none
        assert_eq!(audit.summary.warnings, 5);
        assert_eq!(audit.score, 15);

        let json = serde_json::to_value(&audit).unwrap();
        assert_eq!(json["issues"][0]["content"]["type"], "blog");
        assert_eq!(json["issues"][0]["severity"], "error");
        assert_eq!(json["issues"][0]["field"], "meta_title");
        assert_eq!(json["warnings"][0]["type"], "global");
    }

    #[test]
    fn test_audit_global_checks_pass() {
        let mut settings = SiteSettings::default();
        settings.social.og_default_image = Some("/uploads/og.png".to_string());
        settings.verification.google_site_verification = Some("abc123".to_string());
        let audit = audit_site(&settings, &[], &[]);
        assert!(audit.issues.is_empty());
        assert!(audit.warnings.is_empty());
        assert_eq!(audit.passed, vec!["Default meta description is set"]);
        assert_eq!(audit.score, 80);

        settings.default_meta_description = "too short".to_string();
        let audit = audit_site(&settings, &[], &[]);
        assert_eq!(audit.issues.len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_score_is_monotonic_and_clamped(i in 0usize..20, w in 0usize..20, p in 0usize..20) {
            let score = calculate_score(i, w, p);
            prop_assert!(score <= 100);
            if i + w + p > 0 {
                prop_assert!(calculate_score(i + 1, w, p) <= score);
                prop_assert!(calculate_score(i, w, p + 1) >= score);
                prop_assert!(calculate_score(i, w + 1, p) <= score);
            }
        }
    }
}
