use thiserror::Error;

use crate::notify::EnqueueError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Enqueue error: {0}")]
    Enqueue(#[from] EnqueueError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] uuid::Error),

    #[error("Article not found: {0}")]
    ArticleNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Tag not found: {0}")]
    TagNotFound(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
