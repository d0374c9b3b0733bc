//! Settings service
//!
//! Owns the process-wide `SiteSettings` document. It is loaded once at
//! startup (or the defaults are stored when none exist) and every mutation
//! writes through to the repository before replacing the in-memory copy.
//! Mutations are serialized by the write lock, so positional redirect
//! deletes never race each other.

use crate::cache::Cache;
use crate::db::repositories::SettingsRepository;
use crate::models::{CreateRedirectInput, Redirect, SiteSettings};
use crate::services::sitemap::invalidate_sitemap;
use crate::services::validation::FieldViolation;
use anyhow::Context;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SettingsServiceError {
    #[error("{0}")]
    Validation(FieldViolation),

    #[error("Redirect for this source already exists: {0}")]
    DuplicateRedirect(String),

    #[error("Redirect not found")]
    RedirectNotFound,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<FieldViolation> for SettingsServiceError {
    fn from(violation: FieldViolation) -> Self {
        SettingsServiceError::Validation(violation)
    }
}

pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    cache: Arc<Cache>,
    current: RwLock<SiteSettings>,
}

impl SettingsService {
    /// Load the stored document, storing the defaults on first start
    pub async fn load(repo: Arc<dyn SettingsRepository>, cache: Arc<Cache>) -> anyhow::Result<Self> {
        let settings = match repo.load().await? {
            Some(settings) => settings,
            None => {
                let defaults = SiteSettings::default();
                repo.save(&defaults, None)
                    .await
                    .context("Failed to store default site settings")?;
                info!("Initialized default site settings");
                defaults
            }
        };
        Ok(Self::with_settings(repo, cache, settings))
    }

    /// Service seeded with a fixed document, without reading storage
    pub fn with_settings(repo: Arc<dyn SettingsRepository>, cache: Arc<Cache>, settings: SiteSettings) -> Self {
        Self {
            repo,
            cache,
            current: RwLock::new(settings),
        }
    }

    pub async fn get(&self) -> SiteSettings {
        self.current.read().await.clone()
    }

    /// Replace the whole document
    pub async fn replace(
        &self,
        mut settings: SiteSettings,
        updated_by: Option<i64>,
    ) -> Result<SiteSettings, SettingsServiceError> {
        settings.site_url = settings.site_url.trim().to_string();
        if settings.site_url.is_empty() {
            return Err(FieldViolation::new("site_url", "Site URL is required").into());
        }
        for redirect in &mut settings.redirects {
            redirect.source = normalize_source(&redirect.source)?;
            redirect.destination = normalize_destination(&redirect.destination)?;
        }
        let mut seen = HashSet::new();
        for redirect in &settings.redirects {
            if !seen.insert(redirect.source.as_str()) {
                return Err(SettingsServiceError::DuplicateRedirect(redirect.source.clone()));
            }
        }

        let mut current = self.current.write().await;
        self.repo.save(&settings, updated_by).await?;
        *current = settings.clone();
        drop(current);

        invalidate_sitemap(&self.cache).await;
        info!(updated_by, "Site settings updated");
        Ok(settings)
    }

    pub async fn redirects(&self) -> Vec<Redirect> {
        self.current.read().await.redirects.clone()
    }

    /// Append a redirect; sources must be unique
    pub async fn add_redirect(
        &self,
        input: CreateRedirectInput,
        updated_by: Option<i64>,
    ) -> Result<Vec<Redirect>, SettingsServiceError> {
        let source = normalize_source(&input.source)?;
        let destination = normalize_destination(&input.destination)?;

        self.mutate(updated_by, |settings| {
            if settings.redirects.iter().any(|r| r.source == source) {
                return Err(SettingsServiceError::DuplicateRedirect(source.clone()));
            }
            settings.redirects.push(Redirect {
                id: Uuid::new_v4(),
                source: source.clone(),
                destination: destination.clone(),
                status_code: input.status_code,
                active: true,
            });
            Ok(())
        })
        .await
    }

    /// Remove the redirect at a list position
    pub async fn remove_redirect_at(
        &self,
        index: usize,
        updated_by: Option<i64>,
    ) -> Result<Vec<Redirect>, SettingsServiceError> {
        self.mutate(updated_by, |settings| {
            if index >= settings.redirects.len() {
                return Err(SettingsServiceError::RedirectNotFound);
            }
            settings.redirects.remove(index);
            Ok(())
        })
        .await
    }

    /// Remove the redirect with a stable id
    pub async fn remove_redirect(
        &self,
        id: Uuid,
        updated_by: Option<i64>,
    ) -> Result<Vec<Redirect>, SettingsServiceError> {
        self.mutate(updated_by, |settings| {
            let position = settings
                .redirects
                .iter()
                .position(|r| r.id == id)
                .ok_or(SettingsServiceError::RedirectNotFound)?;
            settings.redirects.remove(position);
            Ok(())
        })
        .await
    }

    /// Active redirect whose source equals `path`
    pub async fn find_redirect(&self, path: &str) -> Option<Redirect> {
        self.current
            .read()
            .await
            .redirects
            .iter()
            .find(|r| r.active && r.source == path)
            .cloned()
    }

    /// Apply a change to a copy of the document, persist it, then publish it.
    /// Returns the resulting redirect list.
    async fn mutate<F>(&self, updated_by: Option<i64>, change: F) -> Result<Vec<Redirect>, SettingsServiceError>
    where
        F: FnOnce(&mut SiteSettings) -> Result<(), SettingsServiceError>,
    {
        let mut current = self.current.write().await;
        let mut next = current.clone();
        change(&mut next)?;
        self.repo.save(&next, updated_by).await?;
        *current = next;
        let redirects = current.redirects.clone();
        drop(current);

        invalidate_sitemap(&self.cache).await;
        Ok(redirects)
    }
}

fn normalize_source(source: &str) -> Result<String, FieldViolation> {
    let source = source.trim();
    if !source.starts_with('/') {
        return Err(FieldViolation::new("source", "Redirect source must be a path starting with '/'"));
    }
    Ok(source.to_string())
}

fn normalize_destination(destination: &str) -> Result<String, FieldViolation> {
    let destination = destination.trim();
    if destination.is_empty() {
        return Err(FieldViolation::new("destination", "Redirect destination is required"));
    }
    Ok(destination.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::SqlxSettingsRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::models::RedirectCode;

    async fn setup() -> (Arc<dyn SettingsRepository>, SettingsService) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let repo = SqlxSettingsRepository::boxed(pool);
        let service = SettingsService::load(repo.clone(), Arc::new(MemoryCache::new()))
            .await
            .unwrap();
        (repo, service)
    }

    fn redirect(source: &str) -> CreateRedirectInput {
        CreateRedirectInput {
            source: source.to_string(),
            destination: "/new".to_string(),
            status_code: RedirectCode::Permanent,
        }
    }

    #[tokio::test]
    async fn test_load_stores_defaults() {
        let (repo, service) = setup().await;
        assert_eq!(service.get().await, SiteSettings::default());
        assert_eq!(repo.load().await.unwrap(), Some(SiteSettings::default()));
    }

    #[tokio::test]
    async fn test_duplicate_redirect_leaves_list_unchanged() {
        let (_repo, service) = setup().await;
        service.add_redirect(redirect("/old"), None).await.unwrap();

        let result = service.add_redirect(redirect(" /old "), None).await;
        assert!(matches!(result, Err(SettingsServiceError::DuplicateRedirect(_))));
        assert_eq!(service.redirects().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_by_index_and_id() {
        let (repo, service) = setup().await;
        service.add_redirect(redirect("/a"), None).await.unwrap();
        service.add_redirect(redirect("/b"), None).await.unwrap();
        let list = service.add_redirect(redirect("/c"), None).await.unwrap();

        assert!(matches!(
            service.remove_redirect_at(3, None).await,
            Err(SettingsServiceError::RedirectNotFound)
        ));

        let list_after = service.remove_redirect_at(0, None).await.unwrap();
        let sources: Vec<&str> = list_after.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["/b", "/c"]);

        let remaining = service.remove_redirect(list[2].id, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(repo.load().await.unwrap().unwrap().redirects.len(), 1);
    }

    #[tokio::test]
    async fn test_find_redirect_ignores_inactive() {
        let (_repo, service) = setup().await;
        service.add_redirect(redirect("/live"), None).await.unwrap();
        let mut settings = service.get().await;
        settings.redirects.push(Redirect {
            id: Uuid::new_v4(),
            source: "/off".to_string(),
            destination: "/x".to_string(),
            status_code: RedirectCode::Temporary,
            active: false,
        });
        service.replace(settings, None).await.unwrap();

        assert!(service.find_redirect("/live").await.is_some());
        assert!(service.find_redirect("/off").await.is_none());
        assert!(service.find_redirect("/missing").await.is_none());
    }

    #[tokio::test]
    async fn test_replace_rejects_duplicate_sources() {
        let (_repo, service) = setup().await;
        let mut settings = SiteSettings::default();
        for _ in 0..2 {
            settings.redirects.push(Redirect {
                id: Uuid::new_v4(),
                source: "/dup".to_string(),
                destination: "/x".to_string(),
                status_code: RedirectCode::Permanent,
                active: true,
            });
        }
        assert!(matches!(
            service.replace(settings, None).await,
            Err(SettingsServiceError::DuplicateRedirect(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_source_is_validation_error() {
        let (_repo, service) = setup().await;
        assert!(matches!(
            service.add_redirect(redirect("old"), None).await,
            Err(SettingsServiceError::Validation(_))
        ));
    }
}
