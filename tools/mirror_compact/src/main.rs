use dotenvy::dotenv;
use message_mirror::db::{self, repository};
use std::env;

fn is_dry_run() -> bool {
    !std::env::args().any(|a| a == "--apply")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://message_mirror.db".to_string());
    let pool = db::connect(&database_url).await?;

    let snapshot = repository::load_indexed(&pool).await?;
    let unreadable: Vec<String> = snapshot.unreadable().cloned().collect();

    println!(
        "Index entries: {} readable, {} missing, {} corrupt",
        snapshot.messages.len(),
        snapshot.missing.len(),
        snapshot.corrupt.len()
    );

    if unreadable.is_empty() {
        println!("Nothing to compact");
        return Ok(());
    }

    if is_dry_run() {
        for unique_id in &unreadable {
            println!("[DRY RUN] Would prune {}", unique_id);
        }
        return Ok(());
    }

    let pruned = repository::prune_index(&pool, &unreadable).await?;
    println!("Pruned: {} / {}", pruned, unreadable.len());

    Ok(())
}
