//! Settings repository
//!
//! The site settings live in a single row (`id = 1`) as one JSON document.

use crate::db::{sqlite, DynDatabasePool};
use crate::models::SiteSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// The stored document, or `None` before the first save
    async fn load(&self) -> Result<Option<SiteSettings>>;

    /// Replace the stored document
    async fn save(&self, settings: &SiteSettings, updated_by: Option<i64>) -> Result<()>;
}

pub struct SqlxSettingsRepository {
    pool: DynDatabasePool,
}

impl SqlxSettingsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SettingsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
    async fn load(&self) -> Result<Option<SiteSettings>> {
        let row = sqlx::query("SELECT document FROM site_settings WHERE id = 1")
            .fetch_optional(sqlite(&self.pool)?)
            .await
            .context("Failed to load site settings")?;

        match row {
            Some(row) => {
                let document: String = row.get("document");
                let settings = serde_json::from_str(&document)
                    .context("Stored site settings are not valid JSON")?;
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, settings: &SiteSettings, updated_by: Option<i64>) -> Result<()> {
        let document = serde_json::to_string(settings)?;
        sqlx::query(
            r#"
            INSERT INTO site_settings (id, document, updated_by, updated_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                document = excluded.document,
                updated_by = excluded.updated_by,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(document)
        .bind(updated_by)
        .bind(Utc::now())
        .execute(sqlite(&self.pool)?)
        .await
        .context("Failed to save site settings")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> Arc<dyn SettingsRepository> {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        SqlxSettingsRepository::boxed(pool)
    }

    #[tokio::test]
    async fn test_load_before_save_is_none() {
        let repo = setup().await;
        assert!(repo.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_single_row() {
        let repo = setup().await;
        let mut settings = SiteSettings::default();
        repo.save(&settings, None).await.unwrap();

        settings.site_name = "Renamed".to_string();
        repo.save(&settings, None).await.unwrap();

        let loaded = repo.load().await.unwrap().unwrap();
        assert_eq!(loaded.site_name, "Renamed");
        assert_eq!(loaded, settings);
    }
}
