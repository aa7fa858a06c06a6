//! `recall stats`: what is imported and how much of it is embedded.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use chat_recall_core::models::Collection;

use crate::config::Config;
use crate::db;

struct SourceStats {
    source: String,
    conversations: i64,
    messages: i64,
    imported_at: String,
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let conversations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
        .fetch_one(&pool)
        .await?;
    let messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(&pool)
        .await?;
    let assistant: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE sender = 'assistant'")
            .fetch_one(&pool)
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Chat Recall - Database Stats");
    println!("============================");
    println!();
    println!("  Database:       {}", config.db.path.display());
    println!("  Size:           {}", format_bytes(db_size));
    println!();
    println!("  Conversations:  {}", conversations);
    println!("  Messages:       {} ({} assistant)", messages, assistant);
    println!();
    println!("  Vector collections:");
    for collection in Collection::ALL {
        let count = collection_count(&pool, collection).await?;
        println!("    {:<22} {:>8}", collection.name(), count);
    }

    let sources = source_stats(&pool).await?;
    if !sources.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<20} {:>8} {:>9}   {}",
            "SOURCE", "CONVS", "MESSAGES", "IMPORTED"
        );
        println!("  {}", "-".repeat(62));
        for s in &sources {
            println!(
                "  {:<20} {:>8} {:>9}   {}",
                s.source, s.conversations, s.messages, s.imported_at
            );
        }
    }
    println!();

    pool.close().await;
    Ok(())
}

async fn collection_count(pool: &SqlitePool, collection: Collection) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM vector_records WHERE collection = ?")
        .bind(collection.name())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

async fn source_stats(pool: &SqlitePool) -> Result<Vec<SourceStats>> {
    let rows = sqlx::query(
        r#"
        SELECT
            s.id AS source,
            s.imported_at AS imported_at,
            COUNT(DISTINCT c.id) AS conversations,
            COUNT(m.id) AS messages
        FROM sources s
        LEFT JOIN conversations c ON c.source_id = s.id
        LEFT JOIN messages m ON m.conversation_id = c.id
        GROUP BY s.id
        ORDER BY conversations DESC, s.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| SourceStats {
            source: row.get("source"),
            conversations: row.get("conversations"),
            messages: row.get("messages"),
            imported_at: row.get("imported_at"),
        })
        .collect())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
