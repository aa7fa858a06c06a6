//! Incremental vector indexing over the two chunk collections.
//!
//! The [`Indexer`] turns conversations and assistant messages into chunks,
//! embeds them, and adds them to the vector store. Chunk ids are derived
//! from content ids (`conv-<id>`, `msg-<id>[-c<i>]`), so re-running the
//! indexer only embeds what is missing:
//!
//! ```text
//! all conversations ──► conv-<id> present? ──yes──► skip
//!                              │ no
//!                              ▼
//!                       topic chunk ──► batch ──► embed ──► add
//! ```
//!
//! Batches are committed one at a time. A failing batch aborts the run and
//! leaves earlier batches in place; the next run resumes where it stopped.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::chunk::{
    conversation_topic_chunk, message_chunks, topic_chunk_id, CHUNK_OVERLAP, MAX_CHUNK_CHARS,
};
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::RecallError;
use crate::models::{Chunk, Collection, VectorHit, VectorRecord};
use crate::store::{ContentStore, Predicate, VectorStore};

/// Default number of records embedded and written per batch.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Chunking and batching parameters.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub max_chars: usize,
    pub overlap: usize,
    pub batch_size: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            max_chars: MAX_CHUNK_CHARS,
            overlap: CHUNK_OVERLAP,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Receives progress after each committed batch.
pub trait EmbedProgress: Send + Sync {
    fn report(&self, done: usize, total: usize, label: &str);
}

/// Newly added chunk counts from [`Indexer::embed_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmbedReport {
    pub conversations: usize,
    pub messages: usize,
}

/// Record counts per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub conversation_topics: usize,
    pub message_chunks: usize,
}

pub struct Indexer {
    content: Arc<dyn ContentStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    options: IndexOptions,
    progress: Option<Arc<dyn EmbedProgress>>,
}

impl Indexer {
    /// Open both collections, creating them when missing.
    pub async fn open(
        content: Arc<dyn ContentStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        options: IndexOptions,
    ) -> Result<Self> {
        for collection in Collection::ALL {
            vectors
                .create_collection(collection)
                .await
                .with_context(|| format!("failed to open collection '{}'", collection))?;
        }
        Ok(Self {
            content,
            vectors,
            embedder,
            options,
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn EmbedProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    /// Embed a topic chunk for every conversation not yet indexed.
    pub async fn embed_conversations(&self) -> Result<usize> {
        let existing = self
            .vectors
            .existing_ids(Collection::ConversationTopics)
            .await?;
        let conversations = self.content.all_conversations().await?;

        let mut pending: Vec<Chunk> = Vec::new();
        for conversation in &conversations {
            if existing.contains(&topic_chunk_id(&conversation.id)) {
                continue;
            }
            let messages = self.content.conversation_messages(&conversation.id).await?;
            match conversation_topic_chunk(conversation, &messages) {
                Some(chunk) => pending.push(chunk),
                None => tracing::debug!(conversation = %conversation.id, "empty topic text, skipped"),
            }
        }

        tracing::info!(
            total = conversations.len(),
            already_indexed = existing.len(),
            pending = pending.len(),
            "embedding conversation topics"
        );
        self.write_batches(Collection::ConversationTopics, &pending, "conversations")
            .await
    }

    /// Embed chunks of every assistant message not yet indexed.
    pub async fn embed_messages(&self) -> Result<usize> {
        let existing = self.vectors.existing_ids(Collection::MessageChunks).await?;
        let messages = self.content.assistant_messages().await?;

        let pending: Vec<Chunk> = messages
            .iter()
            .flat_map(|m| message_chunks(m, self.options.max_chars, self.options.overlap))
            .filter(|c| !existing.contains(&c.id))
            .collect();

        tracing::info!(
            messages = messages.len(),
            already_indexed = existing.len(),
            pending = pending.len(),
            "embedding message chunks"
        );
        self.write_batches(Collection::MessageChunks, &pending, "messages")
            .await
    }

    /// Run both steps. With `force`, both collections are dropped and
    /// rebuilt from scratch first.
    pub async fn embed_all(&self, force: bool) -> Result<EmbedReport> {
        if force {
            for collection in Collection::ALL {
                self.vectors.delete_collection(collection).await?;
                self.vectors.create_collection(collection).await?;
            }
            tracing::info!("vector collections reset");
        }

        let conversations = self.embed_conversations().await?;
        let messages = self.embed_messages().await?;
        Ok(EmbedReport {
            conversations,
            messages,
        })
    }

    /// Up to `n` records of `collection` nearest to `text`.
    pub async fn query_similar(
        &self,
        text: &str,
        collection: Collection,
        n: usize,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<VectorHit>> {
        let query_vec = embed_query(self.embedder.as_ref(), text).await?;
        self.nearest(&query_vec, collection, n, predicate).await
    }

    /// Like [`Indexer::query_similar`] for an already embedded query.
    pub async fn nearest(
        &self,
        query_vec: &[f32],
        collection: Collection,
        n: usize,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<VectorHit>> {
        self.vectors
            .query_nearest(collection, query_vec, n, predicate)
            .await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            conversation_topics: self.vectors.count(Collection::ConversationTopics).await?,
            message_chunks: self.vectors.count(Collection::MessageChunks).await?,
        })
    }

    async fn write_batches(
        &self,
        collection: Collection,
        chunks: &[Chunk],
        label: &str,
    ) -> Result<usize> {
        let total = chunks.len();
        let mut done = 0;

        for batch in chunks.chunks(self.options.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(|e| RecallError::EmbeddingUnavailable(format!("{:#}", e)))?;
            if vectors.len() != batch.len() {
                return Err(RecallError::EmbeddingCountMismatch {
                    expected: batch.len(),
                    got: vectors.len(),
                }
                .into());
            }

            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, embedding)| VectorRecord {
                    id: chunk.id.clone(),
                    embedding,
                    document: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                })
                .collect();
            self.vectors.add_records(collection, &records).await?;

            done += batch.len();
            tracing::debug!(%collection, done, total, "batch committed");
            if let Some(progress) = &self.progress {
                progress.report(done, total, label);
            }
        }

        Ok(done)
    }
}
