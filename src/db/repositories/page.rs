//! Page repository

use crate::db::{sqlite, DynDatabasePool};
use crate::models::{ContentBlock, Language, Page, PageFilter, PageOrderItem, PageStatus, PageTemplate};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

use super::post::seo_from_column;

const PAGE_COLUMNS: &str = "id, title, slug, template, status, content, content_blocks, parent_id, \
    sort_order, show_in_nav, show_in_footer, seo, language, created_by, updated_by, \
    published_at, created_at, updated_at";

#[async_trait]
pub trait PageRepository: Send + Sync {
    async fn create(&self, page: &Page) -> Result<Page>;
    async fn update(&self, page: &Page) -> Result<Page>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Page>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Page>>;
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
    async fn delete(&self, id: i64) -> Result<bool>;
    /// Matching pages ordered by `order`, then title
    async fn list(&self, filter: &PageFilter) -> Result<Vec<Page>>;
    async fn count_children(&self, id: i64) -> Result<i64>;
    /// Ids on the parent chain of `id`, nearest first
    async fn ancestor_ids(&self, id: i64) -> Result<Vec<i64>>;
    /// Apply a batch of order/parent changes atomically
    async fn reorder(&self, items: &[PageOrderItem]) -> Result<()>;
    async fn count(&self, status: Option<PageStatus>) -> Result<i64>;
    async fn references_media(&self, url: &str) -> Result<bool>;
}

pub struct SqlxPageRepository {
    pool: DynDatabasePool,
}

impl SqlxPageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PageRepository> {
        Arc::new(Self::new(pool))
    }

    fn pool(&self) -> Result<&SqlitePool> {
        sqlite(&self.pool)
    }
}

#[async_trait]
impl PageRepository for SqlxPageRepository {
    async fn create(&self, page: &Page) -> Result<Page> {
        let result = sqlx::query(
            r#"
            INSERT INTO pages (title, slug, template, status, content, content_blocks, parent_id,
                sort_order, show_in_nav, show_in_footer, seo, language, created_by, updated_by,
                published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&page.title)
        .bind(&page.slug)
        .bind(page.template.as_str())
        .bind(page.status.as_str())
        .bind(&page.content)
        .bind(serde_json::to_string(&page.content_blocks)?)
        .bind(page.parent_id)
        .bind(page.order)
        .bind(page.show_in_nav)
        .bind(page.show_in_footer)
        .bind(serde_json::to_string(&page.seo)?)
        .bind(page.language.as_str())
        .bind(page.created_by)
        .bind(page.updated_by)
        .bind(page.published_at)
        .bind(page.created_at)
        .bind(page.updated_at)
        .execute(self.pool()?)
        .await
        .context("Failed to create page")?;

        Ok(Page {
            id: result.last_insert_rowid(),
            ..page.clone()
        })
    }

    async fn update(&self, page: &Page) -> Result<Page> {
        sqlx::query(
            r#"
            UPDATE pages SET title = ?, slug = ?, template = ?, status = ?, content = ?,
                content_blocks = ?, parent_id = ?, sort_order = ?, show_in_nav = ?,
                show_in_footer = ?, seo = ?, language = ?, updated_by = ?, published_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&page.title)
        .bind(&page.slug)
        .bind(page.template.as_str())
        .bind(page.status.as_str())
        .bind(&page.content)
        .bind(serde_json::to_string(&page.content_blocks)?)
        .bind(page.parent_id)
        .bind(page.order)
        .bind(page.show_in_nav)
        .bind(page.show_in_footer)
        .bind(serde_json::to_string(&page.seo)?)
        .bind(page.language.as_str())
        .bind(page.updated_by)
        .bind(page.published_at)
        .bind(page.updated_at)
        .bind(page.id)
        .execute(self.pool()?)
        .await
        .context("Failed to update page")?;

        Ok(page.clone())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Page>> {
        let sql = format!("SELECT {} FROM pages WHERE id = ?", PAGE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool()?)
            .await
            .context("Failed to get page by ID")?;
        row.as_ref().map(row_to_page).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Page>> {
        let sql = format!("SELECT {} FROM pages WHERE slug = ?", PAGE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(self.pool()?)
            .await
            .context("Failed to get page by slug")?;
        row.as_ref().map(row_to_page).transpose()
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM pages WHERE slug = ? AND id != ?")
            .bind(slug)
            .bind(exclude_id.unwrap_or(-1))
            .fetch_one(self.pool()?)
            .await
            .context("Failed to check page slug")?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pages WHERE id = ?")
            .bind(id)
            .execute(self.pool()?)
            .await
            .context("Failed to delete page")?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &PageFilter) -> Result<Vec<Page>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM pages WHERE 1=1", PAGE_COLUMNS));
        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status.as_str());
        }
        if let Some(template) = filter.template {
            qb.push(" AND template = ");
            qb.push_bind(template.as_str());
        }
        if let Some(language) = filter.language {
            qb.push(" AND language = ");
            qb.push_bind(language.as_str());
        }
        match filter.parent_id {
            Some(Some(parent)) => {
                qb.push(" AND parent_id = ");
                qb.push_bind(parent);
            }
            Some(None) => {
                qb.push(" AND parent_id IS NULL");
            }
            None => {}
        }
        qb.push(" ORDER BY sort_order ASC, title ASC, id ASC");

        let rows = qb
            .build()
            .fetch_all(self.pool()?)
            .await
            .context("Failed to list pages")?;
        rows.iter().map(row_to_page).collect()
    }

    async fn count_children(&self, id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM pages WHERE parent_id = ?")
            .bind(id)
            .fetch_one(self.pool()?)
            .await
            .context("Failed to count child pages")?;
        Ok(row.get("count"))
    }

    async fn ancestor_ids(&self, id: i64) -> Result<Vec<i64>> {
        // The depth bound stops the walk on data that already contains a cycle.
        let rows = sqlx::query(
            r#"
            WITH RECURSIVE chain(id, parent_id, depth) AS (
                SELECT id, parent_id, 0 FROM pages WHERE id = ?
                UNION ALL
                SELECT p.id, p.parent_id, chain.depth + 1
                FROM pages p JOIN chain ON p.id = chain.parent_id
                WHERE chain.depth < 256
            )
            SELECT id FROM chain WHERE depth > 0 ORDER BY depth
            "#,
        )
        .bind(id)
        .fetch_all(self.pool()?)
        .await
        .context("Failed to walk page ancestors")?;

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    async fn reorder(&self, items: &[PageOrderItem]) -> Result<()> {
        let mut tx = self.pool()?.begin().await?;
        for item in items {
            sqlx::query("UPDATE pages SET sort_order = ?, parent_id = ? WHERE id = ?")
                .bind(item.order)
                .bind(item.parent_id)
                .bind(item.id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to reorder page {}", item.id))?;
        }
        tx.commit().await.context("Failed to commit page reorder")?;
        Ok(())
    }

    async fn count(&self, status: Option<PageStatus>) -> Result<i64> {
        let row = match status {
            Some(status) => {
                sqlx::query("SELECT COUNT(*) AS count FROM pages WHERE status = ?")
                    .bind(status.as_str())
                    .fetch_one(self.pool()?)
                    .await
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS count FROM pages")
                    .fetch_one(self.pool()?)
                    .await
            }
        }
        .context("Failed to count pages")?;
        Ok(row.get("count"))
    }

    async fn references_media(&self, url: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM pages
            WHERE json_extract(seo, '$.og_image') = ?
               OR instr(content_blocks, ?) > 0
               OR instr(COALESCE(content, ''), ?) > 0
            "#,
        )
        .bind(url)
        .bind(url)
        .bind(url)
        .fetch_one(self.pool()?)
        .await
        .context("Failed to check media references")?;
        Ok(row.get::<i64, _>("count") > 0)
    }
}

fn row_to_page(row: &SqliteRow) -> Result<Page> {
    let template: String = row.get("template");
    let status: String = row.get("status");
    let language: String = row.get("language");
    let blocks: String = row.get("content_blocks");
    let mut content_blocks: Vec<ContentBlock> =
        serde_json::from_str(&blocks).context("Malformed content_blocks column")?;
    content_blocks.sort_by_key(|block| block.order);

    Ok(Page {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        template: PageTemplate::from_str(&template)?,
        status: PageStatus::from_str(&status)?,
        content: row.get("content"),
        content_blocks,
        parent_id: row.get("parent_id"),
        order: row.get("sort_order"),
        show_in_nav: row.get("show_in_nav"),
        show_in_footer: row.get("show_in_footer"),
        seo: seo_from_column(row.get("seo"))?,
        language: Language::from_str(&language)?,
        created_by: row.get("created_by"),
        updated_by: row.get("updated_by"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::{BlockType, SeoMeta};
    use chrono::Utc;

    async fn setup() -> Arc<dyn PageRepository> {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash) VALUES (1, 'u', 'u@example.com', 'h')",
        )
        .execute(sqlite(&pool).unwrap())
        .await
        .unwrap();
        SqlxPageRepository::boxed(pool)
    }

    fn page(slug: &str, parent_id: Option<i64>, order: i64) -> Page {
        let now = Utc::now();
        Page {
            id: 0,
            title: slug.to_uppercase(),
            slug: slug.to_string(),
            template: PageTemplate::Default,
            status: PageStatus::Published,
            content: None,
            content_blocks: vec![],
            parent_id,
            order,
            show_in_nav: true,
            show_in_footer: false,
            seo: SeoMeta::default(),
            language: Language::En,
            created_by: 1,
            updated_by: None,
            published_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_blocks_come_back_sorted() {
        let repo = setup().await;
        let mut input = page("home", None, 0);
        input.content_blocks = vec![
            ContentBlock {
                id: "b".to_string(),
                block_type: BlockType::Text,
                order: 2,
                settings: serde_json::Value::Null,
                content: serde_json::json!({"text": "second"}),
                visible: true,
            },
            ContentBlock {
                id: "a".to_string(),
                block_type: BlockType::Hero,
                order: 1,
                settings: serde_json::Value::Null,
                content: serde_json::Value::Null,
                visible: true,
            },
        ];
        let created = repo.create(&input).await.unwrap();
        let loaded = repo.get_by_id(created.id).await.unwrap().unwrap();
        let ids: Vec<&str> = loaded.content_blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_children_and_ancestors() {
        let repo = setup().await;
        let root = repo.create(&page("root", None, 0)).await.unwrap();
        let mid = repo.create(&page("mid", Some(root.id), 0)).await.unwrap();
        let leaf = repo.create(&page("leaf", Some(mid.id), 0)).await.unwrap();

        assert_eq!(repo.count_children(root.id).await.unwrap(), 1);
        assert_eq!(repo.count_children(leaf.id).await.unwrap(), 0);
        assert_eq!(repo.ancestor_ids(leaf.id).await.unwrap(), vec![mid.id, root.id]);
        assert!(repo.ancestor_ids(root.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_and_order() {
        let repo = setup().await;
        let root = repo.create(&page("b-root", None, 2)).await.unwrap();
        repo.create(&page("a-root", None, 1)).await.unwrap();
        repo.create(&page("child", Some(root.id), 0)).await.unwrap();

        let roots = repo
            .list(&PageFilter {
                parent_id: Some(None),
                ..Default::default()
            })
            .await
            .unwrap();
        let slugs: Vec<&str> = roots.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["a-root", "b-root"]);

        let children = repo
            .list(&PageFilter {
                parent_id: Some(Some(root.id)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
    }

    #[tokio::test]
    async fn test_reorder_updates_order_and_parent() {
        let repo = setup().await;
        let a = repo.create(&page("a", None, 0)).await.unwrap();
        let b = repo.create(&page("b", None, 1)).await.unwrap();

        repo.reorder(&[
            PageOrderItem { id: a.id, order: 5, parent_id: Some(b.id) },
            PageOrderItem { id: b.id, order: 0, parent_id: None },
        ])
        .await
        .unwrap();

        let a = repo.get_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(a.order, 5);
        assert_eq!(a.parent_id, Some(b.id));
    }

    #[tokio::test]
    async fn test_delete_and_slug_exists() {
        let repo = setup().await;
        let created = repo.create(&page("gone", None, 0)).await.unwrap();
        assert!(repo.slug_exists("gone", None).await.unwrap());
        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_slug("gone").await.unwrap().is_none());
    }
}
