//! Data models
//!
//! Stored entities (BlogPost, Page, SiteSettings, User, Session), their
//! closed enums, and the request inputs and filters that operate on them.

mod content;
mod page;
mod post;
mod session;
mod settings;
mod user;

pub use content::{
    ContentKind, ContentRef, FeaturedImage, Language, ListParams, PagedResult, SeoMeta,
    TwitterCard, META_DESCRIPTION_MAX, META_TITLE_MAX, TITLE_MAX,
};
pub use page::{
    BlockType, ContentBlock, CreatePageInput, NavNode, Page, PageFilter, PageOrderItem,
    PageStatus, PageTemplate, UpdatePageInput,
};
pub use post::{
    BlogPost, CategoryCount, CreatePostInput, PostCategory, PostFilter, PostStatus, TagCount,
    UpdatePostInput, EXCERPT_MAX,
};
pub use session::Session;
pub use settings::{
    AnalyticsIds, ChangeFrequencies, ChangeFrequency, ContactPoint, CreateRedirectInput,
    CustomScripts, Organization, PerformanceSettings, PostalAddress, Priorities, PublicSettings,
    Redirect, RedirectCode, RobotsRule, RobotsSettings, SiteSettings, SitemapSettings,
    SocialSettings, StructuredDataSettings, VerificationSettings,
};
pub use user::{CreateUserInput, User, UserRole, UserStatus};
