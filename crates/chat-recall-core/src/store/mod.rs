//! Storage abstractions for chat-recall.
//!
//! The retrieval core talks to three external collaborators through the
//! traits defined here:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`ContentStore`] | Read-only access to conversations and messages |
//! | [`VectorStore`] | Named collections of embedded chunks with k-NN queries |
//! | [`LexicalIndex`] | Full-text index over message text |
//!
//! Implementations must be `Send + Sync`: one store instance is shared by
//! concurrent searches and indexing runs. The SQLite implementation lives in
//! the app crate; [`memory::InMemoryStore`] backs tests.

pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    AssistantMessage, ChunkMetadata, Collection, Conversation, LexicalRow, Message, VectorHit,
    VectorRecord,
};

/// Metadata attribute a [`Predicate`] can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    SourceId,
    Sender,
    Date,
}

impl Field {
    /// Column name used by SQL-backed stores.
    pub fn column(&self) -> &'static str {
        match self {
            Field::SourceId => "source_id",
            Field::Sender => "sender",
            Field::Date => "date",
        }
    }

    fn value<'a>(&self, meta: &'a ChunkMetadata) -> &'a str {
        match self {
            Field::SourceId => &meta.source_id,
            Field::Sender => &meta.sender,
            Field::Date => &meta.date,
        }
    }
}

/// Attribute filter evaluated by the vector store.
///
/// Values compare as strings, so date bounds work on ISO 8601 timestamps.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Field, String),
    Gte(Field, String),
    Lte(Field, String),
    And(Vec<Predicate>),
}

impl Predicate {
    /// Evaluate against a record's metadata.
    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        match self {
            Predicate::Eq(field, v) => field.value(meta) == v,
            Predicate::Gte(field, v) => field.value(meta) >= v.as_str(),
            Predicate::Lte(field, v) => field.value(meta) <= v.as_str(),
            Predicate::And(all) => all.iter().all(|p| p.matches(meta)),
        }
    }
}

/// A full-text query: match any of `terms` against message text only.
#[derive(Debug, Clone, PartialEq)]
pub struct TextMatch {
    pub terms: Vec<String>,
}

impl TextMatch {
    /// Tokenize a raw query on whitespace. Returns `None` when no tokens
    /// remain.
    pub fn from_query(query: &str) -> Option<Self> {
        let terms: Vec<String> = query.split_whitespace().map(String::from).collect();
        if terms.is_empty() {
            None
        } else {
            Some(TextMatch { terms })
        }
    }

    /// Render as an FTS5 MATCH expression scoped to the `text` column.
    ///
    /// Each term is quoted so punctuation is matched literally instead of
    /// being parsed as FTS5 syntax.
    pub fn to_fts5(&self) -> String {
        self.terms
            .iter()
            .map(|t| format!("text:\"{}\"", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

/// Read access to the archive of conversations and messages.
///
/// The retrieval core never writes through this trait.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// All conversations, newest first.
    async fn all_conversations(&self) -> Result<Vec<Conversation>>;

    /// Messages of one conversation, ordered by position.
    async fn conversation_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Every assistant message with non-empty text, joined with its
    /// conversation's name and source.
    async fn assistant_messages(&self) -> Result<Vec<AssistantMessage>>;
}

/// Named collections of embedded chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist.
    async fn create_collection(&self, collection: Collection) -> Result<()>;

    /// Drop the collection and every record in it.
    async fn delete_collection(&self, collection: Collection) -> Result<()>;

    /// Add records. Ids already present are left untouched.
    async fn add_records(&self, collection: Collection, records: &[VectorRecord]) -> Result<()>;

    /// Up to `n` records nearest to `query_vec` by cosine distance,
    /// ascending, restricted to records matching `predicate`.
    async fn query_nearest(
        &self,
        collection: Collection,
        query_vec: &[f32],
        n: usize,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<VectorHit>>;

    /// Number of records in the collection.
    async fn count(&self, collection: Collection) -> Result<usize>;

    /// Ids currently stored in the collection.
    async fn existing_ids(&self, collection: Collection) -> Result<HashSet<String>>;
}

/// Full-text index over message text (conversation name and summary are
/// indexed too but are not matched by [`TextMatch`]).
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Rows matching `query`, best rank first, at most `limit`.
    async fn full_text_search(&self, query: &TextMatch, limit: usize) -> Result<Vec<LexicalRow>>;

    /// Rebuild the index from the content store.
    async fn rebuild(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(source: &str, sender: &str, date: &str) -> ChunkMetadata {
        ChunkMetadata {
            source_id: source.into(),
            sender: sender.into(),
            date: date.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_predicate_matching() {
        let m = meta("claude", "assistant", "2025-03-10T12:00:00Z");
        assert!(Predicate::Eq(Field::SourceId, "claude".into()).matches(&m));
        assert!(!Predicate::Eq(Field::Sender, "human".into()).matches(&m));
        let range = Predicate::And(vec![
            Predicate::Gte(Field::Date, "2025-03-01".into()),
            Predicate::Lte(Field::Date, "2025-03-31".into()),
        ]);
        assert!(range.matches(&m));
        assert!(!Predicate::Gte(Field::Date, "2025-04-01".into()).matches(&m));
    }

    #[test]
    fn test_text_match_tokenizes_on_whitespace() {
        assert!(TextMatch::from_query("   \t\n").is_none());
        let q = TextMatch::from_query("  index  funds ").unwrap();
        assert_eq!(q.terms, vec!["index", "funds"]);
        assert_eq!(q.to_fts5(), "text:\"index\" OR text:\"funds\"");
    }

    #[test]
    fn test_text_match_escapes_quotes() {
        let q = TextMatch::from_query("say \"hi\"").unwrap();
        assert_eq!(q.to_fts5(), "text:\"say\" OR text:\"\"\"hi\"\"\"");
    }
}
