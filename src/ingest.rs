//! Import of normalized conversation archives.
//!
//! An archive is one JSON document per export source:
//!
//! ```json
//! {
//!   "source": { "id": "claude", "name": "Claude.ai export" },
//!   "conversations": [
//!     {
//!       "id": "c1", "name": "Budget", "summary": null,
//!       "created_at": "2025-03-10T12:00:00Z",
//!       "messages": [
//!         { "id": "m1", "sender": "human", "text": "...", "created_at": "..." }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Message positions follow array order. Re-importing a conversation
//! replaces its messages. The FTS index is rebuilt after every import.
//!
//! Timestamps with an offset are stored as UTC RFC 3339 (`...Z`) so that
//! date filters can compare them as strings. Anything else is kept verbatim.
//! Dates shown in context headers are therefore UTC days: a message sent at
//! `2025-03-10T23:30:00-05:00` is displayed as `Mar 11, 2025`.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::path::Path;

use chat_recall_core::models::Sender;
use chat_recall_core::store::LexicalIndex;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Deserialize)]
pub struct Archive {
    pub source: ArchiveSource,
    #[serde(default)]
    pub conversations: Vec<ArchiveConversation>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveSource {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveConversation {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub messages: Vec<ArchiveMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveMessage {
    pub id: String,
    pub sender: Sender,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub conversations: usize,
    pub messages: usize,
}

/// Normalize an RFC 3339 timestamp to UTC with second precision.
pub fn normalize_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(dt) => dt
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        Err(_) => {
            tracing::debug!(timestamp = raw, "timestamp is not RFC 3339, stored as is");
            raw.to_string()
        }
    }
}

pub fn read_archive(path: &Path) -> Result<Archive> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read archive: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse archive: {}", path.display()))
}

/// Write an archive in one transaction, then rebuild the FTS index.
pub async fn import_archive(pool: &SqlitePool, archive: &Archive) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO sources (id, name) VALUES (?, ?)
        ON CONFLICT(id) DO UPDATE SET name = excluded.name, imported_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&archive.source.id)
    .bind(&archive.source.name)
    .execute(&mut *tx)
    .await?;

    for conversation in &archive.conversations {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, source_id, name, summary, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_id = excluded.source_id,
                name = excluded.name,
                summary = excluded.summary,
                created_at = excluded.created_at
            "#,
        )
        .bind(&conversation.id)
        .bind(&archive.source.id)
        .bind(&conversation.name)
        .bind(&conversation.summary)
        .bind(conversation.created_at.as_deref().map(normalize_timestamp))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(&conversation.id)
            .execute(&mut *tx)
            .await?;

        for (position, message) in conversation.messages.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO messages (id, conversation_id, position, sender, text, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&message.id)
            .bind(&conversation.id)
            .bind(position as i64)
            .bind(message.sender.as_str())
            .bind(&message.text)
            .bind(message.created_at.as_deref().map(normalize_timestamp))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert message '{}'", message.id))?;
        }

        report.conversations += 1;
        report.messages += conversation.messages.len();
    }

    tx.commit().await?;

    SqliteStore::new(pool.clone()).rebuild().await?;
    tracing::info!(
        source = %archive.source.id,
        conversations = report.conversations,
        messages = report.messages,
        "archive imported"
    );
    Ok(report)
}

pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let archive = read_archive(path)?;
    let pool = db::connect(config).await?;
    let report = import_archive(&pool, &archive).await?;

    println!("import {}", archive.source.id);
    println!("  conversations: {}", report.conversations);
    println!("  messages: {}", report.messages);
    println!("ok");

    pool.close().await;
    Ok(())
}
