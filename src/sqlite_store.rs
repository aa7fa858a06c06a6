//! SQLite-backed content store, vector store, and FTS5 lexical index.
//!
//! Vectors live in `vector_records` as little-endian f32 BLOBs. Attribute
//! predicates are pushed down into the SQL `WHERE` clause; cosine distance
//! is then computed over the surviving rows.

use std::collections::HashSet;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use chat_recall_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use chat_recall_core::models::{
    AssistantMessage, ChunkMetadata, Collection, Conversation, LexicalRow, Message, Sender,
    VectorHit, VectorRecord,
};
use chat_recall_core::store::{
    ContentStore, LexicalIndex, Predicate, TextMatch, VectorStore,
};

/// SQLite implementation of the storage traits.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn collection_exists(&self, collection: Collection) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM vector_collections WHERE name = ?")
                .bind(collection.name())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

/// Render a predicate as a SQL boolean expression over `vector_records`,
/// pushing bind values in order.
fn predicate_sql(predicate: &Predicate, binds: &mut Vec<String>) -> String {
    match predicate {
        Predicate::Eq(field, value) => {
            binds.push(value.clone());
            format!("{} = ?", field.column())
        }
        Predicate::Gte(field, value) => {
            binds.push(value.clone());
            format!("{} >= ?", field.column())
        }
        Predicate::Lte(field, value) => {
            binds.push(value.clone());
            format!("{} <= ?", field.column())
        }
        Predicate::And(all) if all.is_empty() => "1".to_string(),
        Predicate::And(all) => all
            .iter()
            .map(|p| format!("({})", predicate_sql(p, binds)))
            .collect::<Vec<_>>()
            .join(" AND "),
    }
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    let sender: String = row.try_get("sender")?;
    Ok(Message {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        position: row.try_get("position")?,
        sender: sender.parse::<Sender>()?,
        text: row.try_get("text")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn all_conversations(&self) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT id, source_id, name, summary, created_at FROM conversations ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Conversation {
                    id: row.try_get("id")?,
                    source_id: row.try_get("source_id")?,
                    name: row.try_get("name")?,
                    summary: row.try_get("summary")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn conversation_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, position, sender, text, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY position
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn assistant_messages(&self) -> Result<Vec<AssistantMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.conversation_id, m.position, m.sender, m.text, m.created_at,
                   c.name AS conversation_name, c.source_id
            FROM messages m
            JOIN conversations c ON c.id = m.conversation_id
            WHERE m.sender = 'assistant' AND m.text IS NOT NULL AND m.text != ''
            ORDER BY m.conversation_id, m.position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AssistantMessage {
                    message: message_from_row(row)?,
                    conversation_name: row.try_get("conversation_name")?,
                    source_id: row.try_get("source_id")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn create_collection(&self, collection: Collection) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO vector_collections (name) VALUES (?)")
            .bind(collection.name())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_collection(&self, collection: Collection) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM vector_records WHERE collection = ?")
            .bind(collection.name())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM vector_collections WHERE name = ?")
            .bind(collection.name())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn add_records(&self, collection: Collection, records: &[VectorRecord]) -> Result<()> {
        if !self.collection_exists(collection).await? {
            bail!("collection '{}' does not exist", collection);
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO vector_records
                    (collection, id, conversation_id, message_id, sender, conversation_name,
                     date, source_id, document, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(collection.name())
            .bind(&record.id)
            .bind(&record.metadata.conversation_id)
            .bind(&record.metadata.message_id)
            .bind(&record.metadata.sender)
            .bind(&record.metadata.conversation_name)
            .bind(&record.metadata.date)
            .bind(&record.metadata.source_id)
            .bind(&record.document)
            .bind(record.embedding.len() as i64)
            .bind(vec_to_blob(&record.embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query_nearest(
        &self,
        collection: Collection,
        query_vec: &[f32],
        n: usize,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<VectorHit>> {
        let mut binds = Vec::new();
        let mut sql = String::from(
            r#"
            SELECT id, conversation_id, message_id, sender, conversation_name, date,
                   source_id, document, embedding
            FROM vector_records
            WHERE collection = ?
            "#,
        );
        if let Some(predicate) = predicate {
            sql.push_str(&format!(" AND ({})", predicate_sql(predicate, &mut binds)));
        }
        sql.push_str(" ORDER BY rowid");

        let mut query = sqlx::query(&sql).bind(collection.name());
        for value in &binds {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            hits.push(VectorHit {
                id: row.try_get("id")?,
                document: row.try_get("document")?,
                metadata: ChunkMetadata {
                    conversation_id: row.try_get("conversation_id")?,
                    message_id: row.try_get("message_id")?,
                    sender: row.try_get("sender")?,
                    conversation_name: row.try_get("conversation_name")?,
                    date: row.try_get("date")?,
                    source_id: row.try_get("source_id")?,
                },
                distance: cosine_distance(query_vec, &blob_to_vec(&blob)),
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n);
        Ok(hits)
    }

    async fn count(&self, collection: Collection) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM vector_records WHERE collection = ?")
                .bind(collection.name())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    async fn existing_ids(&self, collection: Collection) -> Result<HashSet<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM vector_records WHERE collection = ?")
                .bind(collection.name())
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl LexicalIndex for SqliteStore {
    async fn full_text_search(&self, query: &TextMatch, limit: usize) -> Result<Vec<LexicalRow>> {
        let rows = sqlx::query(
            r#"
            SELECT m.id AS message_id, m.conversation_id, m.sender, m.text,
                   COALESCE(m.created_at, '') AS created_at,
                   COALESCE(c.name, '') AS conversation_name, c.source_id
            FROM messages_fts
            JOIN messages m ON m.rowid = messages_fts.rowid
            JOIN conversations c ON c.id = m.conversation_id
            WHERE messages_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(query.to_fts5())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(LexicalRow {
                    message_id: row.try_get("message_id")?,
                    conversation_id: row.try_get("conversation_id")?,
                    sender: row.try_get("sender")?,
                    text: row.try_get("text")?,
                    created_at: row.try_get("created_at")?,
                    conversation_name: row.try_get("conversation_name")?,
                    source_id: row.try_get("source_id")?,
                })
            })
            .collect()
    }

    async fn rebuild(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages_fts")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO messages_fts (rowid, text, conversation_name, summary)
            SELECT m.rowid, m.text, c.name, c.summary
            FROM messages m
            JOIN conversations c ON c.id = m.conversation_id
            WHERE m.text IS NOT NULL AND m.text != ''
            "#,
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
