use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A published article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: Option<String>,
    pub author_id: Option<Uuid>,
    pub editor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set by the job runner once a staleness notice has been delivered
    pub last_notified_author_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Data required to create a new article
#[derive(Debug, Clone, Default)]
pub struct NewArticle {
    pub title: String,
    /// Generated from the title when absent
    pub slug: Option<String>,
    pub content: Option<String>,
    pub author_id: Option<Uuid>,
    pub editor_id: Option<Uuid>,
    /// Comma-separated tag tokens, see `TagRepository::ids_from_tokens`
    pub tag_tokens: Option<String>,
}

/// Partial update of an article. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ArticleUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub editor_id: Option<Uuid>,
    pub tag_tokens: Option<String>,
}

impl Article {
    /// URL parameter for the article
    pub fn param(&self) -> &str {
        &self.slug
    }

    pub fn has_been_notified(&self) -> bool {
        self.last_notified_author_at.is_some()
    }
}

impl fmt::Display for Article {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

/// An author or editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}
