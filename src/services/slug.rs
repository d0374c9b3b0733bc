//! Slug generation and validation

use once_cell::sync::Lazy;
use regex::Regex;

static SLUG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("slug pattern is valid"));

/// Derive a URL-safe slug from a title.
///
/// The result is lowercase, limited to `[a-z0-9-]`, with runs of other
/// characters collapsed into one hyphen and no hyphen at either end.
/// Non-ASCII letters are transliterated. May be empty for titles with no
/// alphanumeric content.
pub fn generate_slug(title: &str) -> String {
    slug::slugify(title)
}

/// Whether an explicitly supplied slug is acceptable as-is
pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_PATTERN.is_match(slug)
}

/// First candidate in `base`, `base-2`, `base-3`, ... that `taken` rejects
pub async fn first_free_slug<F, Fut>(base: &str, mut taken: F) -> anyhow::Result<String>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<bool>>,
{
    if !taken(base.to_string()).await? {
        return Ok(base.to_string());
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(candidate.clone()).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Tax Planning 2024"), "tax-planning-2024");
        assert_eq!(generate_slug("  Hello,   World!  "), "hello-world");
        assert_eq!(generate_slug("--already--slugged--"), "already-slugged");
        assert_eq!(generate_slug("Café Société"), "cafe-societe");
        assert_eq!(generate_slug("!!!"), "");
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("tax-planning-2024"));
        assert!(is_valid_slug("a"));
        assert!(!is_valid_slug("Tax-Planning"));
        assert!(!is_valid_slug("double--hyphen"));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug("trailing-"));
        assert!(!is_valid_slug(""));
    }

    #[tokio::test]
    async fn test_first_free_slug_appends_counter() {
        let existing = ["report".to_string(), "report-2".to_string()];
        let slug = first_free_slug("report", |candidate| {
            let taken = existing.contains(&candidate);
            async move { Ok(taken) }
        })
        .await
        .unwrap();
        assert_eq!(slug, "report-3");

        let slug = first_free_slug("fresh", |_| async { Ok(false) }).await.unwrap();
        assert_eq!(slug, "fresh");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn generated_slugs_are_url_safe(title in "\\PC{0,80}") {
            let slug = generate_slug(&title);
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            if !slug.is_empty() {
                prop_assert!(is_valid_slug(&slug));
            }
        }
    }
}
