//! Services layer - Business logic
//!
//! Services own the content rules: validation, derived fields, permission
//! checks and cache invalidation. They sit between the HTTP handlers and
//! the repositories.

pub mod analytics;
pub mod markdown;
pub mod media;
pub mod page;
pub mod password;
pub mod post;
pub mod seo;
pub mod settings;
pub mod sitemap;
pub mod slug;
pub mod user;
pub mod validation;

pub use analytics::{AnalyticsService, Period};
pub use markdown::MarkdownRenderer;
pub use media::{FsMediaStore, MediaStore};
pub use page::{PageService, PageServiceError};
pub use password::{hash_password, verify_password};
pub use post::{PostService, PostServiceError};
pub use seo::{analyze, audit_site, calculate_score, SeoAnalysis, SeoService, SeoServiceError, SiteAudit};
pub use settings::{SettingsService, SettingsServiceError};
pub use sitemap::{SitemapDocument, SitemapService};
pub use slug::generate_slug;
pub use user::{LoginInput, UserService, UserServiceError};
pub use validation::FieldViolation;
