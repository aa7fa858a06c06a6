//! In-memory store implementing all three storage traits.
//!
//! Uses `Vec` and `HashMap` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine distance; full-text search is case-insensitive term
//! containment ranked by the number of matching terms.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::{
    AssistantMessage, Collection, Conversation, LexicalRow, Message, Sender, VectorHit,
    VectorRecord,
};

use super::{ContentStore, LexicalIndex, Predicate, TextMatch, VectorStore};

/// In-memory store for tests and embedding into other tools.
pub struct InMemoryStore {
    conversations: RwLock<Vec<Conversation>>,
    messages: RwLock<Vec<Message>>,
    collections: RwLock<HashMap<Collection, Vec<VectorRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(Vec::new()),
            messages: RwLock::new(Vec::new()),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a conversation together with its messages.
    pub fn insert_conversation(&self, conversation: Conversation, messages: Vec<Message>) {
        self.conversations.write().unwrap().push(conversation);
        self.messages.write().unwrap().extend(messages);
    }

    fn conversation(&self, id: &str) -> Option<Conversation> {
        self.conversations
            .read()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn all_conversations(&self) -> Result<Vec<Conversation>> {
        let mut all = self.conversations.read().unwrap().clone();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn conversation_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let mut msgs: Vec<Message> = self
            .messages
            .read()
            .unwrap()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        msgs.sort_by_key(|m| m.position);
        Ok(msgs)
    }

    async fn assistant_messages(&self) -> Result<Vec<AssistantMessage>> {
        let msgs = self.messages.read().unwrap().clone();
        Ok(msgs
            .into_iter()
            .filter(|m| m.sender == Sender::Assistant)
            .filter(|m| m.text.as_deref().is_some_and(|t| !t.is_empty()))
            .filter_map(|m| {
                let conv = self.conversation(&m.conversation_id)?;
                Some(AssistantMessage {
                    message: m,
                    conversation_name: conv.name,
                    source_id: conv.source_id,
                })
            })
            .collect())
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn create_collection(&self, collection: Collection) -> Result<()> {
        self.collections
            .write()
            .unwrap()
            .entry(collection)
            .or_default();
        Ok(())
    }

    async fn delete_collection(&self, collection: Collection) -> Result<()> {
        self.collections.write().unwrap().remove(&collection);
        Ok(())
    }

    async fn add_records(&self, collection: Collection, records: &[VectorRecord]) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        let Some(stored) = collections.get_mut(&collection) else {
            bail!("collection '{}' does not exist", collection);
        };
        let mut ids: HashSet<String> = stored.iter().map(|r| r.id.clone()).collect();
        for record in records {
            if ids.insert(record.id.clone()) {
                stored.push(record.clone());
            }
        }
        Ok(())
    }

    async fn query_nearest(
        &self,
        collection: Collection,
        query_vec: &[f32],
        n: usize,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<VectorHit>> {
        let collections = self.collections.read().unwrap();
        let Some(stored) = collections.get(&collection) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<VectorHit> = stored
            .iter()
            .filter(|r| predicate.map_or(true, |p| p.matches(&r.metadata)))
            .map(|r| VectorHit {
                id: r.id.clone(),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
                distance: cosine_distance(query_vec, &r.embedding),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n);
        Ok(hits)
    }

    async fn count(&self, collection: Collection) -> Result<usize> {
        Ok(self
            .collections
            .read()
            .unwrap()
            .get(&collection)
            .map_or(0, Vec::len))
    }

    async fn existing_ids(&self, collection: Collection) -> Result<HashSet<String>> {
        Ok(self
            .collections
            .read()
            .unwrap()
            .get(&collection)
            .map(|records| records.iter().map(|r| r.id.clone()).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl LexicalIndex for InMemoryStore {
    async fn full_text_search(&self, query: &TextMatch, limit: usize) -> Result<Vec<LexicalRow>> {
        let terms: Vec<String> = query.terms.iter().map(|t| t.to_lowercase()).collect();
        let msgs = self.messages.read().unwrap().clone();

        let mut scored: Vec<(usize, LexicalRow)> = msgs
            .into_iter()
            .filter_map(|m| {
                let text = m.text.clone().filter(|t| !t.is_empty())?;
                let lower = text.to_lowercase();
                let matches = terms.iter().filter(|t| lower.contains(t.as_str())).count();
                if matches == 0 {
                    return None;
                }
                let conv = self.conversation(&m.conversation_id)?;
                Some((
                    matches,
                    LexicalRow {
                        message_id: m.id,
                        conversation_id: m.conversation_id,
                        sender: m.sender.to_string(),
                        text,
                        created_at: m.created_at.unwrap_or_default(),
                        conversation_name: conv.name.unwrap_or_default(),
                        source_id: conv.source_id,
                    },
                ))
            })
            .collect();

        // Stable: ties keep insertion order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(limit).map(|(_, row)| row).collect())
    }

    async fn rebuild(&self) -> Result<()> {
        // Matches are computed from live messages.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use crate::store::Field;

    fn record(id: &str, v: Vec<f32>, source: &str) -> VectorRecord {
        VectorRecord {
            id: id.into(),
            embedding: v,
            document: format!("doc {}", id),
            metadata: ChunkMetadata {
                conversation_id: "c1".into(),
                source_id: source.into(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_add_ignores_existing_ids() {
        let store = InMemoryStore::new();
        store.create_collection(Collection::MessageChunks).await.unwrap();
        let first = vec![record("a", vec![1.0, 0.0], "claude")];
        store.add_records(Collection::MessageChunks, &first).await.unwrap();
        let again = vec![record("a", vec![0.0, 1.0], "claude"), record("b", vec![0.0, 1.0], "claude")];
        store.add_records(Collection::MessageChunks, &again).await.unwrap();
        assert_eq!(store.count(Collection::MessageChunks).await.unwrap(), 2);

        let hits = store
            .query_nearest(Collection::MessageChunks, &[1.0, 0.0], 1, None)
            .await
            .unwrap();
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_add_to_missing_collection_fails() {
        let store = InMemoryStore::new();
        let recs = vec![record("a", vec![1.0], "claude")];
        assert!(store.add_records(Collection::ConversationTopics, &recs).await.is_err());
    }

    #[tokio::test]
    async fn test_query_applies_predicate() {
        let store = InMemoryStore::new();
        store.create_collection(Collection::MessageChunks).await.unwrap();
        let recs = vec![
            record("a", vec![1.0, 0.0], "claude"),
            record("b", vec![0.9, 0.1], "chatgpt"),
        ];
        store.add_records(Collection::MessageChunks, &recs).await.unwrap();
        let pred = Predicate::Eq(Field::SourceId, "chatgpt".into());
        let hits = store
            .query_nearest(Collection::MessageChunks, &[1.0, 0.0], 10, Some(&pred))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[tokio::test]
    async fn test_delete_collection_drops_records() {
        let store = InMemoryStore::new();
        store.create_collection(Collection::ConversationTopics).await.unwrap();
        let recs = vec![record("a", vec![1.0], "claude")];
        store.add_records(Collection::ConversationTopics, &recs).await.unwrap();
        store.delete_collection(Collection::ConversationTopics).await.unwrap();
        assert_eq!(store.count(Collection::ConversationTopics).await.unwrap(), 0);
        assert!(store.existing_ids(Collection::ConversationTopics).await.unwrap().is_empty());
    }
}
