//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::models::{Conversation, Message, Sender};
use crate::store::memory::InMemoryStore;

const DIMS: usize = 256;

/// Bag-of-words embedder: every lowercase alphanumeric token bumps one
/// FNV-1a hashed bucket. Texts sharing words land close together.
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn new() -> Self {
        HashEmbedder
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in token.to_lowercase().bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % DIMS as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "offline"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(anyhow!("connection refused"))
    }
}

/// Fails only on its `fail_on`-th call (1-based); other calls behave like
/// [`HashEmbedder`].
pub struct FlakyEmbedder {
    calls: AtomicUsize,
    fail_on: usize,
}

impl FlakyEmbedder {
    pub fn failing_on(fail_on: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    fn model_name(&self) -> &str {
        "flaky"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(anyhow!("connection reset"));
        }
        HashEmbedder.embed(texts).await
    }
}

fn conversation(id: &str, source: &str, name: &str, created_at: &str) -> Conversation {
    Conversation {
        id: id.into(),
        source_id: source.into(),
        name: Some(name.into()),
        summary: None,
        created_at: Some(created_at.into()),
    }
}

fn message(id: &str, conv: &str, position: i64, sender: Sender, text: &str, at: &str) -> Message {
    Message {
        id: id.into(),
        conversation_id: conv.into(),
        position,
        sender,
        text: Some(text.into()),
        created_at: Some(at.into()),
    }
}

/// Three conversations over two sources. Message `a-long` is 2000
/// characters and splits into two windows.
pub fn sample_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    let long: String = "Compound interest rewards patience over decades. "
        .chars()
        .cycle()
        .take(2000)
        .collect();

    store.insert_conversation(
        conversation("c1", "claude", "Index fund investing", "2025-03-10T12:00:00Z"),
        vec![
            message("h1", "c1", 0, Sender::Human, "Should I buy index funds for retirement?", "2025-03-10T12:00:00Z"),
            message("a1", "c1", 1, Sender::Assistant, "Index funds offer broad diversification and low fees.", "2025-03-10T12:00:30Z"),
            message("h1b", "c1", 2, Sender::Human, "How long should I hold them?", "2025-03-10T12:01:00Z"),
            message("a-long", "c1", 3, Sender::Assistant, &long, "2025-03-10T12:01:30Z"),
        ],
    );
    store.insert_conversation(
        conversation("c2", "claude", "Trip planning", "2025-04-02T09:00:00Z"),
        vec![
            message("h2", "c2", 0, Sender::Human, "Plan a week in Lisbon", "2025-04-02T09:00:00Z"),
            message("a2", "c2", 1, Sender::Assistant, "Spend three days in Lisbon and take a day trip to Sintra.", "2025-04-02T09:00:40Z"),
        ],
    );
    store.insert_conversation(
        conversation("c3", "chatgpt", "Sourdough bread", "2024-11-20T18:30:00Z"),
        vec![
            message("h3", "c3", 0, Sender::Human, "How do I feed a sourdough starter?", "2024-11-20T18:30:00Z"),
            message("a3", "c3", 1, Sender::Assistant, "Feed the sourdough starter equal weights of flour and water daily.", "2024-11-20T18:30:20Z"),
        ],
    );
    store
}
