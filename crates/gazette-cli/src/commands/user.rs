use anyhow::Result;

use gazette_core::{
    article::NewUser,
    storage::{Database, UserRepository},
};

pub async fn add(db: &Database, name: &str, email: &str) -> Result<()> {
    let user = UserRepository::new(db)
        .create(&NewUser {
            name: name.to_string(),
            email: email.to_string(),
        })
        .await?;

    println!("Created user: {} ({})", user, user.id);
    Ok(())
}

pub async fn list(db: &Database) -> Result<()> {
    let users = UserRepository::new(db).list_all().await?;

    if users.is_empty() {
        println!("No users yet.");
        println!("\nTo add one, run:");
        println!("  gazette user add -n <name> -e <email>");
        return Ok(());
    }

    println!("Users ({}):\n", users.len());
    for user in &users {
        println!("  {}", user);
    }

    Ok(())
}
