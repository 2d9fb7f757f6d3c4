mod article_repo;
mod database;
mod job_repo;
pub mod retry;
mod tag_repo;
mod user_repo;

#[cfg(test)]
pub(crate) mod fixtures;

pub use article_repo::{ArticleRepository, ORDERED_FRESH_LIMIT};
pub use database::Database;
pub use job_repo::{JobRepository, JobStatus, QueuedJob};
pub use tag_repo::TagRepository;
pub use user_repo::UserRepository;
