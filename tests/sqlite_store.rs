//! Library-level tests of the retrieval pipeline over a real SQLite file.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use tempfile::TempDir;

use chat_recall::config::{parse_config, Config};
use chat_recall::embed_cmd::open_indexer;
use chat_recall::ingest::{import_archive, Archive};
use chat_recall::sqlite_store::SqliteStore;
use chat_recall::{db, migrate};
use chat_recall_core::embedding::EmbeddingProvider;
use chat_recall_core::index::Indexer;
use chat_recall_core::models::Collection;
use chat_recall_core::search::{SearchEngine, SearchFilters};
use chat_recall_core::store::VectorStore;

const DIMS: usize = 512;

/// Bag-of-words vectors over hashed lowercase tokens.
struct WordHashEmbedder;

fn word_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hash: u32 = 0x811c9dc5;
        for b in word.to_lowercase().bytes() {
            hash ^= b as u32;
            hash = hash.wrapping_mul(0x01000193);
        }
        v[hash as usize % DIMS] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

#[async_trait]
impl EmbeddingProvider for WordHashEmbedder {
    fn model_name(&self) -> &str {
        "word-hash"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| word_vector(t)).collect())
    }
}

const ARCHIVE: &str = r#"{
  "source": { "id": "claude", "name": "Claude.ai export" },
  "conversations": [
    {
      "id": "c-invest", "name": "Index fund investing", "created_at": "2025-03-10T12:00:00Z",
      "messages": [
        { "id": "m1", "sender": "human", "text": "Should I buy index funds or pick stocks?", "created_at": "2025-03-10T12:00:00Z" },
        { "id": "m2", "sender": "assistant", "text": "Low-cost index funds beat most stock pickers over long horizons.", "created_at": "2025-03-10T12:00:05Z" }
      ]
    },
    {
      "id": "c-bread", "name": "Sourdough bread", "created_at": "2024-11-20T08:00:00Z",
      "messages": [
        { "id": "m3", "sender": "human", "text": "How do I keep a sourdough starter alive?", "created_at": "2024-11-20T08:00:00Z" },
        { "id": "m4", "sender": "assistant", "text": "Feed the starter equal weights of flour and water daily.", "created_at": "2024-11-20T08:00:09Z" }
      ]
    }
  ]
}"#;

async fn setup() -> (TempDir, Config, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let config = parse_config(&format!(
        "[db]\npath = \"{}/recall.sqlite\"\n\n[embedding]\nprovider = \"disabled\"\n",
        tmp.path().display()
    ))
    .unwrap();
    let pool = db::connect(&config).await.unwrap();
    migrate::migrate(&pool).await.unwrap();

    let archive: Archive = serde_json::from_str(ARCHIVE).unwrap();
    import_archive(&pool, &archive).await.unwrap();
    (tmp, config, pool)
}

async fn indexer(config: &Config, pool: &SqlitePool) -> Indexer {
    open_indexer(config, pool, Arc::new(WordHashEmbedder))
        .await
        .unwrap()
}

fn engine(indexer: Indexer, pool: &SqlitePool) -> SearchEngine {
    SearchEngine::new(Arc::new(indexer), Arc::new(SqliteStore::new(pool.clone())))
}

#[tokio::test]
async fn test_embed_all_is_incremental() {
    let (_tmp, config, pool) = setup().await;
    let indexer = indexer(&config, &pool).await;

    let first = indexer.embed_all(false).await.unwrap();
    assert_eq!(first.conversations, 2);
    assert_eq!(first.messages, 2);

    let second = indexer.embed_all(false).await.unwrap();
    assert_eq!(second.conversations, 0);
    assert_eq!(second.messages, 0);

    let stats = indexer.stats().await.unwrap();
    assert_eq!(stats.conversation_topics, 2);
    assert_eq!(stats.message_chunks, 2);
}

#[tokio::test]
async fn test_force_rebuilds_collections() {
    let (_tmp, config, pool) = setup().await;
    let indexer = indexer(&config, &pool).await;
    indexer.embed_all(false).await.unwrap();

    let rebuilt = indexer.embed_all(true).await.unwrap();
    assert_eq!(rebuilt.conversations, 2);
    assert_eq!(rebuilt.messages, 2);
    assert_eq!(indexer.stats().await.unwrap().message_chunks, 2);
}

#[tokio::test]
async fn test_add_records_keeps_existing_ids() {
    let (_tmp, config, pool) = setup().await;
    let indexer = indexer(&config, &pool).await;
    indexer.embed_all(false).await.unwrap();

    let store = SqliteStore::new(pool.clone());
    let ids = store.existing_ids(Collection::MessageChunks).await.unwrap();
    assert!(ids.contains("msg-m2"));
    assert!(ids.contains("msg-m4"));
    assert_eq!(store.count(Collection::ConversationTopics).await.unwrap(), 2);
}

#[tokio::test]
async fn test_keyword_search_over_fts() {
    let (_tmp, config, pool) = setup().await;
    let engine = engine(indexer(&config, &pool).await, &pool);

    let hits = engine.keyword_search("flour", 10).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].message_id, "m4");
    assert_eq!(hits[0].conversation_name, "Sourdough bread");
    assert_eq!(hits[0].source_id, "claude");

    assert!(engine.keyword_search("   ", 10).await.is_empty());
    // A stray quote is escaped instead of breaking the FTS query.
    let quoted = engine.keyword_search("\"flour", 10).await;
    assert_eq!(quoted.len(), 1);
    assert_eq!(quoted[0].message_id, "m4");
}

#[tokio::test]
async fn test_semantic_search_prefers_shared_words() {
    let (_tmp, config, pool) = setup().await;
    let indexer = indexer(&config, &pool).await;
    indexer.embed_all(false).await.unwrap();
    let engine = engine(indexer, &pool);

    let hits = engine
        .semantic_search("sourdough starter flour water", 4, &SearchFilters::default())
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].conversation_id, "c-bread");
    for pair in hits.windows(2) {
        assert!(pair[0].score <= pair[1].score);
    }
}

#[tokio::test]
async fn test_semantic_filters_narrow_results() {
    let (_tmp, config, pool) = setup().await;
    let indexer = indexer(&config, &pool).await;
    indexer.embed_all(false).await.unwrap();
    let engine = engine(indexer, &pool);

    let filters = SearchFilters {
        sender: Some("assistant".into()),
        ..Default::default()
    };
    let hits = engine.semantic_search("index funds", 10, &filters).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.sender == "assistant"));

    let filters = SearchFilters {
        date_from: Some("2025-01-01".into()),
        ..Default::default()
    };
    let hits = engine.semantic_search("sourdough", 10, &filters).await.unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.conversation_id == "c-invest"));
}

#[tokio::test]
async fn test_hybrid_search_fuses_both_lists() {
    let (_tmp, config, pool) = setup().await;
    let indexer = indexer(&config, &pool).await;
    indexer.embed_all(false).await.unwrap();
    let engine = engine(indexer, &pool);

    let hits = engine
        .hybrid_search("flour water daily", 3, &SearchFilters::default())
        .await
        .unwrap();
    // m4 is ranked first by both retrievers.
    assert_eq!(hits[0].message_id, "m4");
    assert!((hits[0].score - 2.0 / 61.0).abs() < 1e-9);
    assert!(hits.len() <= 3);
}
