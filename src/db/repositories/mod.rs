//! Database repositories
//!
//! One repository per stored entity. Services hold them as
//! `Arc<dyn ...Repository>` so tests can swap in other backends.

pub mod page;
pub mod post;
pub mod session;
pub mod settings;
pub mod user;

pub use page::{PageRepository, SqlxPageRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use settings::{SettingsRepository, SqlxSettingsRepository};
pub use user::{SqlxUserRepository, UserRepository};
