use anyhow::{bail, Result};
use chrono::Utc;
use uuid::Uuid;

use gazette_core::{
    article::{is_fresh, is_stale, Article, NewArticle},
    storage::{ArticleRepository, Database, UserRepository},
};

/// Arguments of `gazette article add`
pub struct AddArticle {
    pub title: String,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub editor: Option<String>,
    pub tags: Option<String>,
}

async fn user_id_by_email(db: &Database, email: Option<&str>) -> Result<Option<Uuid>> {
    let Some(email) = email else {
        return Ok(None);
    };

    match UserRepository::new(db).find_by_email(email).await? {
        Some(user) => Ok(Some(user.id)),
        None => bail!("No user with email '{}'. Add one with `gazette user add`.", email),
    }
}

pub async fn add(db: &Database, input: AddArticle) -> Result<()> {
    let author_id = user_id_by_email(db, input.author.as_deref()).await?;
    let editor_id = user_id_by_email(db, input.editor.as_deref()).await?;

    let article = ArticleRepository::new(db)
        .create(&NewArticle {
            title: input.title,
            slug: input.slug,
            content: input.content,
            author_id,
            editor_id,
            tag_tokens: input.tags,
        })
        .await?;

    println!("Created article: {} (/{})", article, article.param());
    Ok(())
}

pub async fn list(db: &Database, fresh: bool, stale: bool) -> Result<()> {
    let repo = ArticleRepository::new(db);
    let now = Utc::now();

    let articles = if fresh {
        repo.fresh(now).await?
    } else if stale {
        repo.stale(now).await?
    } else {
        repo.list_all().await?
    };

    print_articles(&articles);
    Ok(())
}

pub async fn recent(db: &Database) -> Result<()> {
    let articles = ArticleRepository::new(db).ordered_fresh().await?;
    print_articles(&articles);
    Ok(())
}

pub async fn search(db: &Database, query: &str) -> Result<()> {
    let articles = ArticleRepository::new(db).text_search(query).await?;
    print_articles(&articles);
    Ok(())
}

pub async fn show(db: &Database, slug: &str) -> Result<()> {
    let repo = ArticleRepository::new(db);
    let Some(article) = repo.find_by_slug(slug).await? else {
        bail!("Article '{}' not found.", slug);
    };

    let users = UserRepository::new(db);
    let author = match article.author_id {
        Some(id) => users.find_by_id(id).await?,
        None => None,
    };
    let editor = match article.editor_id {
        Some(id) => users.find_by_id(id).await?,
        None => None,
    };

    println!("{}", article);
    println!("  Slug:    {}", article.slug);
    println!("  Status:  {}", status_label(&article));
    if let Some(author) = author {
        println!("  Author:  {}", author);
    }
    if let Some(editor) = editor {
        println!("  Editor:  {}", editor);
    }
    if !article.tags.is_empty() {
        println!("  Tags:    {}", article.tags.join(", "));
    }
    println!("  Updated: {}", article.updated_at.format("%Y-%m-%d %H:%M"));
    if let Some(notified) = article.last_notified_author_at {
        println!("  Author last notified: {}", notified.format("%Y-%m-%d %H:%M"));
    }
    if let Some(content) = &article.content {
        println!("\n{}", content);
    }

    Ok(())
}

fn status_label(article: &Article) -> &'static str {
    let now = Utc::now();
    if is_fresh(article, now) {
        "fresh"
    } else if is_stale(article, now) {
        "stale"
    } else {
        "-"
    }
}

fn print_articles(articles: &[Article]) {
    if articles.is_empty() {
        println!("No articles found.");
        return;
    }

    println!("Articles ({}):\n", articles.len());
    for article in articles {
        let tags = if article.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", article.tags.join(", "))
        };
        println!(
            "  {:<6} {} - {}{}",
            status_label(article),
            article.updated_at.format("%Y-%m-%d"),
            article,
            tags
        );
        println!("         /{}", article.param());
    }
}
