//! Database migrations
//!
//! Migrations are embedded in the binary as SQL strings and tracked in the
//! `_migrations` table. Each one runs at most once, in version order.
//!
//! Structured sub-records (SEO block, featured image, tags, content blocks,
//! the site settings document) are stored as JSON text columns.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::pool::sqlite;
use super::DynDatabasePool;

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (unique, ascending)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements, separated by `;`
    pub up: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'author',
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_posts",
        up: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(200) NOT NULL,
                slug VARCHAR(255) NOT NULL UNIQUE,
                excerpt TEXT,
                content TEXT NOT NULL,
                content_html TEXT NOT NULL,
                featured_image TEXT,
                category VARCHAR(40) NOT NULL DEFAULT 'insights',
                tags TEXT NOT NULL DEFAULT '[]',
                author_id INTEGER NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                published_at TIMESTAMP,
                scheduled_at TIMESTAMP,
                seo TEXT,
                views INTEGER NOT NULL DEFAULT 0,
                read_time INTEGER NOT NULL DEFAULT 0,
                language VARCHAR(5) NOT NULL DEFAULT 'en',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE RESTRICT
            );
            CREATE INDEX IF NOT EXISTS idx_posts_slug ON posts(slug);
            CREATE INDEX IF NOT EXISTS idx_posts_status_published ON posts(status, published_at);
            CREATE INDEX IF NOT EXISTS idx_posts_category ON posts(category);
            CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id);
        "#,
    },
    Migration {
        version: 4,
        name: "create_pages",
        up: r#"
            CREATE TABLE IF NOT EXISTS pages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(200) NOT NULL,
                slug VARCHAR(255) NOT NULL UNIQUE,
                template VARCHAR(20) NOT NULL DEFAULT 'default',
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                content TEXT,
                content_blocks TEXT NOT NULL DEFAULT '[]',
                parent_id INTEGER,
                sort_order INTEGER NOT NULL DEFAULT 0,
                show_in_nav INTEGER NOT NULL DEFAULT 1,
                show_in_footer INTEGER NOT NULL DEFAULT 0,
                seo TEXT,
                language VARCHAR(5) NOT NULL DEFAULT 'en',
                created_by INTEGER NOT NULL,
                updated_by INTEGER,
                published_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (parent_id) REFERENCES pages(id) ON DELETE RESTRICT,
                FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE RESTRICT,
                FOREIGN KEY (updated_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pages_slug ON pages(slug);
            CREATE INDEX IF NOT EXISTS idx_pages_status ON pages(status);
            CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(parent_id);
        "#,
    },
    Migration {
        version: 5,
        name: "create_site_settings",
        up: r#"
            CREATE TABLE IF NOT EXISTS site_settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                document TEXT NOT NULL,
                updated_by INTEGER,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (updated_by) REFERENCES users(id) ON DELETE SET NULL
            );
        "#,
    },
];

/// Run all pending migrations.
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(sqlite(pool)?)
        .await
        .context("Failed to read applied migrations")?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

/// Apply one migration inside a transaction so a failing statement leaves
/// no half-created schema behind.
async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let sqlite_pool: &SqlitePool = sqlite(pool)?;
    let mut tx = sqlite_pool.begin().await?;

    for statement in split_sql_statements(migration.up) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, dropping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines().all(|line| {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed.starts_with("--")
    })
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    async fn insert_user(pool: &SqlitePool) -> i64 {
        sqlx::query(
            "INSERT INTO users (username, email, password_hash, role) VALUES ('u', 'u@example.com', 'h', 'admin')",
        )
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_pending_count_and_up_to_date() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());
        assert!(!is_up_to_date(&pool).await.unwrap());

        run_migrations(&pool).await.unwrap();
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
        assert!(is_up_to_date(&pool).await.unwrap());
    }

    #[tokio::test]
    async fn test_post_slug_is_unique() {
        let pool = migrated_pool().await;
        let sqlite_pool = sqlite(&pool).unwrap();
        let author = insert_user(sqlite_pool).await;

        let insert = "INSERT INTO posts (title, slug, content, content_html, author_id) VALUES ('t', 'same', 'c', '<p>c</p>', ?)";
        sqlx::query(insert).bind(author).execute(sqlite_pool).await.unwrap();
        let second = sqlx::query(insert).bind(author).execute(sqlite_pool).await;
        assert!(second.is_err(), "duplicate post slug should be rejected");
    }

    #[tokio::test]
    async fn test_page_parent_must_exist() {
        let pool = migrated_pool().await;
        let sqlite_pool = sqlite(&pool).unwrap();
        let author = insert_user(sqlite_pool).await;

        let result = sqlx::query(
            "INSERT INTO pages (title, slug, parent_id, created_by) VALUES ('t', 'orphan', 9999, ?)",
        )
        .bind(author)
        .execute(sqlite_pool)
        .await;
        assert!(result.is_err(), "dangling parent reference should be rejected");
    }

    #[tokio::test]
    async fn test_page_with_children_cannot_be_deleted_at_storage_level() {
        let pool = migrated_pool().await;
        let sqlite_pool = sqlite(&pool).unwrap();
        let author = insert_user(sqlite_pool).await;

        let parent = sqlx::query("INSERT INTO pages (title, slug, created_by) VALUES ('p', 'parent', ?)")
            .bind(author)
            .execute(sqlite_pool)
            .await
            .unwrap()
            .last_insert_rowid();
        sqlx::query("INSERT INTO pages (title, slug, parent_id, created_by) VALUES ('c', 'child', ?, ?)")
            .bind(parent)
            .bind(author)
            .execute(sqlite_pool)
            .await
            .unwrap();

        let result = sqlx::query("DELETE FROM pages WHERE id = ?")
            .bind(parent)
            .execute(sqlite_pool)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_site_settings_is_singleton() {
        let pool = migrated_pool().await;
        let sqlite_pool = sqlite(&pool).unwrap();

        sqlx::query("INSERT INTO site_settings (id, document) VALUES (1, '{}')")
            .execute(sqlite_pool)
            .await
            .unwrap();
        let second = sqlx::query("INSERT INTO site_settings (id, document) VALUES (2, '{}')")
            .execute(sqlite_pool)
            .await;
        assert!(second.is_err());
    }

    #[test]
    fn test_split_sql_statements_skips_comments() {
        let sql = "-- leading comment\n;CREATE TABLE a (id INTEGER);\n  \nCREATE INDEX i ON a(id)";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INTEGER)", "CREATE INDEX i ON a(id)"]);
    }

    #[test]
    fn test_truncate_sql() {
        let long = "x".repeat(150);
        assert_eq!(truncate_sql(&long).len(), 103);
        assert_eq!(truncate_sql("short"), "short");
    }
}
