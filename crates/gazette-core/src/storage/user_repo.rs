use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::database::is_unique_violation;
use super::Database;
use crate::article::{NewUser, User};
use crate::clock::{Clock, SystemClock};
use crate::{Error, Result};

/// Repository for authors and editors
pub struct UserRepository<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            name: row.name,
            email: row.email,
            created_at: row.created_at,
        }
    }
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self::with_clock(db, &SystemClock)
    }

    /// Use `clock` for `created_at` stamps
    pub fn with_clock(db: &'a Database, clock: &'a dyn Clock) -> Self {
        Self { db, clock }
    }

    /// Create a user. Emails are unique.
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        let name = new_user.name.trim();
        let email = new_user.email.trim();

        if name.is_empty() {
            return Err(Error::Validation("name can't be blank".to_string()));
        }
        if !email.contains('@') {
            return Err(Error::Validation(format!("invalid email: {}", email)));
        }

        let id = Uuid::new_v4();

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, name, email, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(email)
        .bind(self.clock.now())
        .execute(self.db.pool())
        .await;

        if let Err(err) = result {
            if is_unique_violation(&err) {
                return Err(Error::Validation(format!("email {} has already been taken", email)));
            }
            return Err(err.into());
        }

        self.find_by_id(id)
            .await?
            .ok_or_else(|| Error::UserNotFound(id.to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, name, email, created_at FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(User::from))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, name, email, created_at FROM users WHERE email = ?",
        )
        .bind(email.trim())
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(User::from))
    }

    pub async fn list_all(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, name, email, created_at FROM users ORDER BY name ASC",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }
}
