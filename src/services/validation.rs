//! Field validation and derived values shared by posts and pages

use crate::models::{SeoMeta, META_DESCRIPTION_MAX, META_TITLE_MAX, TITLE_MAX};
use crate::services::slug::{generate_slug, is_valid_slug};

const WORDS_PER_MINUTE: usize = 200;

/// A rejected input field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub type FieldResult<T> = Result<T, FieldViolation>;

/// Trimmed, non-empty title of at most `TITLE_MAX` characters
pub fn validate_title(title: &str) -> FieldResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(FieldViolation::new("title", "Title is required"));
    }
    if title.chars().count() > TITLE_MAX {
        return Err(FieldViolation::new(
            "title",
            format!("Title cannot exceed {} characters", TITLE_MAX),
        ));
    }
    Ok(title.to_string())
}

pub fn validate_max_len(field: &'static str, value: &str, max: usize) -> FieldResult<()> {
    if value.chars().count() > max {
        return Err(FieldViolation::new(
            field,
            format!("{} cannot exceed {} characters", field, max),
        ));
    }
    Ok(())
}

pub fn validate_seo(seo: &SeoMeta) -> FieldResult<()> {
    if let Some(title) = &seo.meta_title {
        validate_max_len("seo.meta_title", title, META_TITLE_MAX)?;
    }
    if let Some(description) = &seo.meta_description {
        validate_max_len("seo.meta_description", description, META_DESCRIPTION_MAX)?;
    }
    Ok(())
}

/// The explicit slug when one is given, otherwise one derived from `title`
pub fn resolve_slug(explicit: Option<&str>, title: &str) -> FieldResult<String> {
    match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => validate_slug(slug),
        None => {
            let slug = generate_slug(title);
            if slug.is_empty() {
                return Err(FieldViolation::new(
                    "slug",
                    "Cannot derive a slug from this title; supply one explicitly",
                ));
            }
            Ok(slug)
        }
    }
}

pub fn validate_slug(slug: &str) -> FieldResult<String> {
    let slug = slug.trim();
    if !is_valid_slug(slug) {
        return Err(FieldViolation::new(
            "slug",
            "Slug may only contain lowercase letters, digits and single hyphens",
        ));
    }
    Ok(slug.to_string())
}

/// Trim, lowercase and de-duplicate tags, keeping first-seen order
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Minutes to read at 200 words per minute, rounded up
pub fn read_time(text: &str) -> i64 {
    word_count(text).div_ceil(WORDS_PER_MINUTE) as i64
}
