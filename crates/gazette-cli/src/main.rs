use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gazette_core::{storage::Database, AppConfig, Clock, FixedClock, SystemClock};

mod commands;

#[derive(Parser)]
#[command(name = "gazette")]
#[command(author, version, about = "Article store with staleness notifications")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage authors and editors
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage articles
    Article {
        #[command(subcommand)]
        action: ArticleAction,
    },
    /// Queue staleness notifications for stale articles (the daily batch)
    Notify {
        /// Pretend the current time is this RFC 3339 timestamp
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,
    },
    /// Deliver queued staleness notifications
    Work {
        /// Pretend the current time is this RFC 3339 timestamp
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,
    },
    /// Run the batch and the job worker on their configured intervals
    Daemon,
}

#[derive(Subcommand)]
enum UserAction {
    /// Add a user
    Add {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
    },
    /// List users
    List,
}

#[derive(Subcommand)]
enum ArticleAction {
    /// Add an article
    Add {
        #[arg(short, long)]
        title: String,
        /// URL slug (generated from the title when omitted)
        #[arg(long)]
        slug: Option<String>,
        #[arg(short, long)]
        content: Option<String>,
        /// Author email
        #[arg(short, long)]
        author: Option<String>,
        /// Editor email
        #[arg(short, long)]
        editor: Option<String>,
        /// Tag tokens: existing tag ids or <<<new tag>>>, comma separated
        #[arg(long)]
        tags: Option<String>,
    },
    /// List articles
    List {
        /// Only articles updated in the last week
        #[arg(long, conflicts_with = "stale")]
        fresh: bool,
        /// Only articles not updated for six months
        #[arg(long)]
        stale: bool,
    },
    /// The most recently updated articles
    Recent,
    /// Search titles and content
    Search {
        /// Search text (lists everything when omitted)
        query: Option<String>,
    },
    /// Show one article
    Show { slug: String },
}

fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

fn clock_at(at: Option<DateTime<Utc>>) -> Box<dyn Clock> {
    match at {
        Some(at) => Box::new(FixedClock::new(at)),
        None => Box::new(SystemClock),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Initialize database
    let db = Arc::new(Database::new(&config).await?);

    match cli.command {
        Commands::User { action } => match action {
            UserAction::Add { name, email } => commands::user::add(&db, &name, &email).await,
            UserAction::List => commands::user::list(&db).await,
        },
        Commands::Article { action } => match action {
            ArticleAction::Add {
                title,
                slug,
                content,
                author,
                editor,
                tags,
            } => {
                let input = commands::article::AddArticle {
                    title,
                    slug,
                    content,
                    author,
                    editor,
                    tags,
                };
                commands::article::add(&db, input).await
            }
            ArticleAction::List { fresh, stale } => commands::article::list(&db, fresh, stale).await,
            ArticleAction::Recent => commands::article::recent(&db).await,
            ArticleAction::Search { query } => {
                commands::article::search(&db, query.as_deref().unwrap_or("")).await
            }
            ArticleAction::Show { slug } => commands::article::show(&db, &slug).await,
        },
        Commands::Notify { at } => commands::notify::run(&db, clock_at(at).as_ref()).await,
        Commands::Work { at } => commands::work::run(&db, &config, clock_at(at).as_ref()).await,
        Commands::Daemon => commands::daemon::run(db, config).await,
    }
}
