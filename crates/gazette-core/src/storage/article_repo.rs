use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, Transaction};
use uuid::Uuid;

use super::database::is_unique_violation;
use super::retry::with_retry;
use super::tag_repo::ids_from_tokens_inner;
use super::Database;
use crate::article::{fresh_cutoff, parameterize, stale_cutoff, Article, ArticleUpdate, NewArticle};
use crate::clock::{Clock, SystemClock};
use crate::{Error, Result};

/// Number of articles returned by [`ArticleRepository::ordered_fresh`]
pub const ORDERED_FRESH_LIMIT: u32 = 20;

const ARTICLE_COLUMNS: &str = "id, title, slug, content, author_id, editor_id, \
     created_at, updated_at, last_notified_author_at";

/// Repository for article CRUD operations and freshness scopes
pub struct ArticleRepository<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
}

#[derive(FromRow)]
struct ArticleRow {
    id: String,
    title: String,
    slug: String,
    content: Option<String>,
    author_id: Option<String>,
    editor_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_notified_author_at: Option<DateTime<Utc>>,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Article {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            title: row.title,
            slug: row.slug,
            content: row.content,
            author_id: row.author_id.and_then(|id| Uuid::parse_str(&id).ok()),
            editor_id: row.editor_id.and_then(|id| Uuid::parse_str(&id).ok()),
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_notified_author_at: row.last_notified_author_at,
            tags: Vec::new(),
        }
    }
}

impl<'a> ArticleRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self::with_clock(db, &SystemClock)
    }

    /// Use `clock` for `created_at`/`updated_at` stamps
    pub fn with_clock(db: &'a Database, clock: &'a dyn Clock) -> Self {
        Self { db, clock }
    }

    /// Create an article, generating its slug from the title when none is given.
    ///
    /// The article row, any tags created from `<<<name>>>` tokens and the tag
    /// links are written in one transaction: a rejected token saves nothing.
    pub async fn create(&self, new_article: &NewArticle) -> Result<Article> {
        let slug = match &new_article.slug {
            Some(slug) => slug.trim().to_string(),
            None => parameterize(&new_article.title),
        };
        self.validate_slug(&slug).await?;

        let id = Uuid::new_v4();
        let now = self.clock.now();

        let mut tx = self.db.pool().begin().await?;

        let tag_ids = match &new_article.tag_tokens {
            Some(tokens) => Some(ids_from_tokens_inner(&mut tx, tokens, now).await?),
            None => None,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO articles
            (id, title, slug, content, author_id, editor_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&new_article.title)
        .bind(&slug)
        .bind(&new_article.content)
        .bind(new_article.author_id.map(|id| id.to_string()))
        .bind(new_article.editor_id.map(|id| id.to_string()))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await;

        if let Err(err) = result {
            // Another writer took the slug between the check and the insert
            if is_unique_violation(&err) {
                return Err(slug_taken(&slug));
            }
            return Err(err.into());
        }

        if let Some(tag_ids) = tag_ids {
            replace_tags_inner(&mut tx, id, &tag_ids).await?;
        }

        tx.commit().await?;

        tracing::debug!(article_id = %id, slug = %slug, "Created article");

        self.require(id).await
    }

    /// Apply `update` and bump `updated_at`. The slug never changes.
    pub async fn update(&self, id: Uuid, update: &ArticleUpdate) -> Result<Article> {
        let now = self.clock.now();

        let mut tx = self.db.pool().begin().await?;

        let tag_ids = match &update.tag_tokens {
            Some(tokens) => Some(ids_from_tokens_inner(&mut tx, tokens, now).await?),
            None => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE articles
            SET title = COALESCE(?, title),
                content = COALESCE(?, content),
                editor_id = COALESCE(?, editor_id),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.title)
        .bind(&update.content)
        .bind(update.editor_id.map(|id| id.to_string()))
        .bind(now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::ArticleNotFound(id.to_string()));
        }

        if let Some(tag_ids) = tag_ids {
            replace_tags_inner(&mut tx, id, &tag_ids).await?;
        }

        tx.commit().await?;

        self.require(id).await
    }

    /// Find an article by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Article>> {
        let query = format!("SELECT {} FROM articles WHERE id = ?", ARTICLE_COLUMNS);
        let row: Option<ArticleRow> = sqlx::query_as(&query)
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await?;

        match row {
            Some(r) => Ok(Some(self.with_tags(Article::from(r)).await?)),
            None => Ok(None),
        }
    }

    /// Find an article by slug
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        let query = format!("SELECT {} FROM articles WHERE slug = ?", ARTICLE_COLUMNS);
        let row: Option<ArticleRow> = sqlx::query_as(&query)
            .bind(slug)
            .fetch_optional(self.db.pool())
            .await?;

        match row {
            Some(r) => Ok(Some(self.with_tags(Article::from(r)).await?)),
            None => Ok(None),
        }
    }

    /// Delete an article, returning whether it existed
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(id.to_string())
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All articles, newest first
    pub async fn list_all(&self) -> Result<Vec<Article>> {
        let query = format!(
            "SELECT {} FROM articles ORDER BY created_at DESC",
            ARTICLE_COLUMNS
        );
        let rows: Vec<ArticleRow> = sqlx::query_as(&query).fetch_all(self.db.pool()).await?;
        self.attach_tags(rows).await
    }

    /// Articles created or updated within the last week
    pub async fn fresh(&self, now: DateTime<Utc>) -> Result<Vec<Article>> {
        let query = format!(
            "SELECT {} FROM articles WHERE updated_at >= ? ORDER BY updated_at DESC",
            ARTICLE_COLUMNS
        );
        let rows: Vec<ArticleRow> = sqlx::query_as(&query)
            .bind(fresh_cutoff(now))
            .fetch_all(self.db.pool())
            .await?;
        self.attach_tags(rows).await
    }

    /// Articles not updated for six months
    pub async fn stale(&self, now: DateTime<Utc>) -> Result<Vec<Article>> {
        let query = format!(
            "SELECT {} FROM articles WHERE updated_at < ? ORDER BY updated_at ASC",
            ARTICLE_COLUMNS
        );
        let rows: Vec<ArticleRow> = sqlx::query_as(&query)
            .bind(stale_cutoff(now))
            .fetch_all(self.db.pool())
            .await?;
        self.attach_tags(rows).await
    }

    /// Whether the article with `id` is in the fresh scope
    pub async fn is_fresh(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let article = self.require(id).await?;
        Ok(crate::article::is_fresh(&article, now))
    }

    /// Whether the article with `id` is in the stale scope
    pub async fn is_stale(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let article = self.require(id).await?;
        Ok(crate::article::is_stale(&article, now))
    }

    /// Case-insensitive search over title and content.
    ///
    /// A blank query returns every article, most recently updated first.
    pub async fn text_search(&self, query: &str) -> Result<Vec<Article>> {
        let query = query.trim();

        if query.is_empty() {
            let sql = format!(
                "SELECT {} FROM articles ORDER BY updated_at DESC",
                ARTICLE_COLUMNS
            );
            let rows: Vec<ArticleRow> = sqlx::query_as(&sql).fetch_all(self.db.pool()).await?;
            return self.attach_tags(rows).await;
        }

        let pattern = format!("%{}%", query);
        let sql = format!(
            "SELECT {} FROM articles WHERE title LIKE ? OR content LIKE ? ORDER BY title ASC",
            ARTICLE_COLUMNS
        );
        let rows: Vec<ArticleRow> = sqlx::query_as(&sql)
            .bind(&pattern)
            .bind(&pattern)
            .fetch_all(self.db.pool())
            .await?;
        self.attach_tags(rows).await
    }

    /// The most recently updated articles
    pub async fn ordered_fresh(&self) -> Result<Vec<Article>> {
        let query = format!(
            "SELECT {} FROM articles ORDER BY updated_at DESC LIMIT ?",
            ARTICLE_COLUMNS
        );
        let rows: Vec<ArticleRow> = sqlx::query_as(&query)
            .bind(ORDERED_FRESH_LIMIT)
            .fetch_all(self.db.pool())
            .await?;
        self.attach_tags(rows).await
    }

    /// Replace the article's tags with the ones named by `tokens`
    pub async fn set_tag_tokens(&self, article_id: Uuid, tokens: &str) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        let tag_ids = ids_from_tokens_inner(&mut tx, tokens, self.clock.now()).await?;
        replace_tags_inner(&mut tx, article_id, &tag_ids).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Tag names for an article, alphabetical
    pub async fn get_tags(&self, article_id: Uuid) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT t.name
            FROM article_tags j
            JOIN tags t ON t.id = j.tag_id
            WHERE j.article_id = ?
            ORDER BY t.name ASC
            "#,
        )
        .bind(article_id.to_string())
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Record that the author was sent a staleness notice at `at`.
    ///
    /// Does not touch `updated_at`: being notified does not make an article
    /// fresh.
    pub async fn mark_author_notified(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if at > self.clock.now() {
            return Err(Error::Validation(format!(
                "notification time {} is in the future",
                at.to_rfc3339()
            )));
        }

        let id_str = id.to_string();
        let result = with_retry(|| {
            sqlx::query("UPDATE articles SET last_notified_author_at = ? WHERE id = ?")
                .bind(at)
                .bind(&id_str)
                .execute(self.db.pool())
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::ArticleNotFound(id_str));
        }

        Ok(())
    }

    async fn require(&self, id: Uuid) -> Result<Article> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| Error::ArticleNotFound(id.to_string()))
    }

    async fn validate_slug(&self, slug: &str) -> Result<()> {
        if slug.is_empty() {
            return Err(Error::Validation("slug can't be blank".to_string()));
        }
        if self.find_by_slug(slug).await?.is_some() {
            return Err(slug_taken(slug));
        }
        Ok(())
    }

    async fn with_tags(&self, mut article: Article) -> Result<Article> {
        article.tags = self.get_tags(article.id).await?;
        Ok(article)
    }

    async fn attach_tags(&self, rows: Vec<ArticleRow>) -> Result<Vec<Article>> {
        let mut articles = Vec::with_capacity(rows.len());
        for row in rows {
            articles.push(self.with_tags(Article::from(row)).await?);
        }
        Ok(articles)
    }
}

/// Replace tag links within an existing transaction.
async fn replace_tags_inner(
    tx: &mut Transaction<'_, Sqlite>,
    article_id: Uuid,
    tag_ids: &[Uuid],
) -> Result<()> {
    sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
        .bind(article_id.to_string())
        .execute(&mut **tx)
        .await?;

    for tag_id in tag_ids {
        sqlx::query("INSERT INTO article_tags (article_id, tag_id) VALUES (?, ?)")
            .bind(article_id.to_string())
            .bind(tag_id.to_string())
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

fn slug_taken(slug: &str) -> Error {
    Error::Validation(format!("slug '{}' has already been taken", slug))
}
