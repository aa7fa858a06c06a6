//! Core data models used throughout chat-recall.
//!
//! These types represent the conversations, messages, chunks, vector records,
//! and search results that flow through the indexing and retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RecallError;

/// Author role of a message. Closed set: anything else is rejected at
/// ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Human,
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::Human => "human",
            Sender::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = RecallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(Sender::Human),
            "assistant" => Ok(Sender::Assistant),
            other => Err(RecallError::InvalidSender(other.to_string())),
        }
    }
}

/// A stored conversation, as supplied by the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub source_id: String,
    pub name: Option<String>,
    pub summary: Option<String>,
    /// Creation timestamp exactly as the archive supplied it.
    pub created_at: Option<String>,
}

/// A stored message belonging to a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub position: i64,
    pub sender: Sender,
    pub text: Option<String>,
    pub created_at: Option<String>,
}

/// An assistant message joined with the conversation fields needed for
/// vector metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantMessage {
    pub message: Message,
    pub conversation_name: Option<String>,
    pub source_id: String,
}

/// The two vector collections maintained by the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// One topic chunk per conversation.
    ConversationTopics,
    /// Per-message (and sub-message) chunks of assistant replies.
    MessageChunks,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::ConversationTopics, Collection::MessageChunks];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::ConversationTopics => "conversation_topics",
            Collection::MessageChunks => "message_chunks",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = RecallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conversation_topics" => Ok(Collection::ConversationTopics),
            "message_chunks" => Ok(Collection::MessageChunks),
            other => Err(RecallError::UnknownCollection(other.to_string())),
        }
    }
}

/// Metadata stored alongside every vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub conversation_id: String,
    /// Empty for conversation-topic chunks.
    pub message_id: String,
    /// Empty for conversation-topic chunks.
    pub sender: String,
    pub conversation_name: String,
    /// Creation timestamp (raw string), used for date filtering.
    pub date: String,
    pub source_id: String,
}

/// A unit of text that receives exactly one embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Stable, content-derived identifier (`conv-…` or `msg-…`).
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk plus its embedding, as persisted in a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: ChunkMetadata,
}

/// A vector store hit with its cosine distance (lower = more similar).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
    pub distance: f64,
}

/// A row returned by the full-text index, ordered by engine rank.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalRow {
    pub message_id: String,
    pub conversation_id: String,
    pub sender: String,
    pub text: String,
    pub created_at: String,
    pub conversation_name: String,
    pub source_id: String,
}

/// A retrieval result.
///
/// The meaning of `score` depends on where the result came from: a cosine
/// distance for semantic hits (lower = better), a `0.0` placeholder for
/// lexical hits, the RRF value after fusion and the cross-encoder scalar
/// after reranking (both higher = better).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub conversation_id: String,
    /// Empty for conversation-level hits.
    pub message_id: String,
    pub conversation_name: String,
    pub text: String,
    pub score: f64,
    pub source_id: String,
    pub sender: String,
    pub created_at: String,
}

impl SearchResult {
    /// Identity used for de-duplication and fusion: the message id when
    /// present, the conversation id otherwise.
    pub fn dedup_key(&self) -> &str {
        if self.message_id.is_empty() {
            &self.conversation_id
        } else {
            &self.message_id
        }
    }

    pub(crate) fn from_hit(hit: VectorHit) -> Self {
        SearchResult {
            conversation_id: hit.metadata.conversation_id,
            message_id: hit.metadata.message_id,
            conversation_name: hit.metadata.conversation_name,
            text: hit.document,
            score: hit.distance,
            source_id: hit.metadata.source_id,
            sender: hit.metadata.sender,
            created_at: hit.metadata.date,
        }
    }

    pub(crate) fn from_lexical(row: LexicalRow) -> Self {
        SearchResult {
            conversation_id: row.conversation_id,
            message_id: row.message_id,
            conversation_name: row.conversation_name,
            text: row.text,
            score: 0.0,
            source_id: row.source_id,
            sender: row.sender,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_rejects_unknown_roles() {
        assert_eq!("human".parse::<Sender>().unwrap(), Sender::Human);
        assert_eq!("assistant".parse::<Sender>().unwrap(), Sender::Assistant);
        assert!("system".parse::<Sender>().is_err());
        assert!(serde_json::from_str::<Sender>("\"tool\"").is_err());
    }

    #[test]
    fn test_collection_names() {
        for c in Collection::ALL {
            assert_eq!(c.name().parse::<Collection>().unwrap(), c);
        }
        assert!("topics".parse::<Collection>().is_err());
    }

    #[test]
    fn test_dedup_key_prefers_message_id() {
        let mut r = SearchResult {
            conversation_id: "c1".into(),
            message_id: "m1".into(),
            conversation_name: String::new(),
            text: String::new(),
            score: 0.0,
            source_id: String::new(),
            sender: String::new(),
            created_at: String::new(),
        };
        assert_eq!(r.dedup_key(), "m1");
        r.message_id.clear();
        assert_eq!(r.dedup_key(), "c1");
    }
}
