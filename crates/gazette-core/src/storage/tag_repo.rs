use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

use super::Database;
use crate::article::Tag;
use crate::clock::{Clock, SystemClock};
use crate::{Error, Result};

/// Repository for tags
pub struct TagRepository<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
}

/// Matches a new-tag token such as `<<<rust>>>`
fn new_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<<<(.+?)>>>").expect("new-tag pattern is valid"))
}

impl<'a> TagRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self::with_clock(db, &SystemClock)
    }

    /// Use `clock` for `created_at` stamps
    pub fn with_clock(db: &'a Database, clock: &'a dyn Clock) -> Self {
        Self { db, clock }
    }

    /// Return the tag called `name`, creating it if needed
    pub async fn find_or_create(&self, name: &str) -> Result<Tag> {
        let mut tx = self.db.pool().begin().await?;
        let tag = find_or_create_inner(&mut tx, name, self.clock.now()).await?;
        tx.commit().await?;
        Ok(tag)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Tag>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id, name FROM tags WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(self.db.pool())
                .await?;

        Ok(row.map(tag_from_row))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id, name FROM tags WHERE name = ?")
                .bind(name)
                .fetch_optional(self.db.pool())
                .await?;

        Ok(row.map(tag_from_row))
    }

    pub async fn list_all(&self) -> Result<Vec<Tag>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, name FROM tags ORDER BY name ASC")
                .fetch_all(self.db.pool())
                .await?;

        Ok(rows.into_iter().map(tag_from_row).collect())
    }

    /// Resolve tag tokens from a token input field into tag ids.
    ///
    /// `tokens` is a comma-separated list. A `<<<name>>>` token stands for a
    /// tag that may not exist yet and is created on the fly; every other token
    /// must be the id of an existing tag. Duplicates are dropped, first
    /// occurrence wins. Nothing is created when any token is rejected.
    pub async fn ids_from_tokens(&self, tokens: &str) -> Result<Vec<Uuid>> {
        let mut tx = self.db.pool().begin().await?;
        let ids = ids_from_tokens_inner(&mut tx, tokens, self.clock.now()).await?;
        tx.commit().await?;
        Ok(ids)
    }
}

async fn find_or_create_inner(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
    now: DateTime<Utc>,
) -> Result<Tag> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("tag name can't be blank".to_string()));
    }

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO tags (id, name, created_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    let row: Option<(String, String)> = sqlx::query_as("SELECT id, name FROM tags WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?;

    row.map(tag_from_row)
        .ok_or_else(|| Error::TagNotFound(name.to_string()))
}

/// Token resolution inside the caller's transaction, so tags created for
/// `<<<name>>>` tokens roll back with it.
pub(super) async fn ids_from_tokens_inner(
    tx: &mut Transaction<'_, Sqlite>,
    tokens: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>> {
    let pattern = new_tag_pattern();

    let mut created: HashMap<String, Uuid> = HashMap::new();
    for caps in pattern.captures_iter(tokens) {
        let name = caps[1].to_string();
        if !created.contains_key(&name) {
            let tag = find_or_create_inner(tx, &name, now).await?;
            created.insert(name, tag.id);
        }
    }

    let resolved = pattern.replace_all(tokens, |caps: &regex::Captures| {
        created
            .get(&caps[1])
            .map(|id| id.to_string())
            .unwrap_or_default()
    });

    let mut ids = Vec::new();
    for token in resolved.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let id = Uuid::parse_str(token).map_err(|_| Error::TagNotFound(token.to_string()))?;
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut **tx)
            .await?;
        if exists.is_none() {
            return Err(Error::TagNotFound(token.to_string()));
        }
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    Ok(ids)
}

fn tag_from_row((id, name): (String, String)) -> Tag {
    Tag {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_existing_ids_and_new_names() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = TagRepository::new(&db);
        let rust = repo.find_or_create("rust").await.unwrap();

        let tokens = format!("{}, <<<databases>>>", rust.id);
        let ids = repo.ids_from_tokens(&tokens).await.unwrap();

        let databases = repo.find_by_name("databases").await.unwrap().unwrap();
        assert_eq!(ids, vec![rust.id, databases.id]);
    }

    #[tokio::test]
    async fn test_new_tag_name_may_contain_commas() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = TagRepository::new(&db);

        let ids = repo.ids_from_tokens("<<<pens, paper>>>").await.unwrap();

        assert_eq!(ids.len(), 1);
        let tag = repo.find_by_id(ids[0]).await.unwrap().unwrap();
        assert_eq!(tag.name, "pens, paper");
    }

    #[tokio::test]
    async fn test_repeated_tokens_are_deduplicated() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = TagRepository::new(&db);

        let ids = repo.ids_from_tokens("<<<go>>>,<<<go>>>").await.unwrap();

        assert_eq!(ids.len(), 1);
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_id_is_rejected() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = TagRepository::new(&db);

        let missing = Uuid::new_v4().to_string();
        assert!(matches!(
            repo.ids_from_tokens(&missing).await,
            Err(Error::TagNotFound(_))
        ));
        assert!(matches!(
            repo.ids_from_tokens("not-a-uuid").await,
            Err(Error::TagNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_tokens_create_nothing() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = TagRepository::new(&db);

        let result = repo.ids_from_tokens("<<<rust>>>,not-a-tag").await;

        assert!(matches!(result, Err(Error::TagNotFound(_))));
        assert!(repo.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_created_at_uses_clock() {
        let db = Database::new_in_memory().await.unwrap();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        let repo = TagRepository::with_clock(&db, &clock);

        let tag = repo.find_or_create("rust").await.unwrap();

        let (created_at,): (DateTime<Utc>,) =
            sqlx::query_as("SELECT created_at FROM tags WHERE id = ?")
                .bind(tag.id.to_string())
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(created_at, clock.now());
    }

    #[tokio::test]
    async fn test_empty_tokens() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = TagRepository::new(&db);

        assert!(repo.ids_from_tokens("").await.unwrap().is_empty());
        assert!(repo.ids_from_tokens(" , ").await.unwrap().is_empty());
    }
}
