mod freshness;
mod models;
mod slug;

pub use freshness::{fresh_cutoff, is_fresh, is_stale, stale_cutoff, FRESH_WINDOW_DAYS, STALE_WINDOW_MONTHS};
pub use models::{Article, ArticleUpdate, NewArticle, NewUser, Tag, User};
pub use slug::parameterize;
