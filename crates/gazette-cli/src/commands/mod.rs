pub mod article;
pub mod daemon;
pub mod notify;
pub mod user;
pub mod work;
