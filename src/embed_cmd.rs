//! `recall embed`: fill both vector collections from the content tables.

use std::sync::Arc;

use anyhow::{bail, Result};
use sqlx::SqlitePool;

use chat_recall_core::embedding::EmbeddingProvider;
use chat_recall_core::index::Indexer;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::progress::ProgressMode;
use crate::sqlite_store::SqliteStore;

/// Open an [`Indexer`] over the SQLite store with the configured provider.
pub async fn open_indexer(
    config: &Config,
    pool: &SqlitePool,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<Indexer> {
    let store = Arc::new(SqliteStore::new(pool.clone()));
    Indexer::open(store.clone(), store, provider, config.index_options()).await
}

/// Embed whatever is missing. With `force`, both collections are dropped
/// and rebuilt from scratch.
pub async fn run_embed(config: &Config, force: bool, progress: ProgressMode) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider: Arc<dyn EmbeddingProvider> = embedding::create_provider(&config.embedding)?.into();
    let model_name = provider.model_name().to_string();
    let pool = db::connect(config).await?;

    let mut indexer = open_indexer(config, &pool, provider).await?;
    if let Some(reporter) = progress.reporter() {
        indexer = indexer.with_progress(reporter);
    }

    let report = indexer.embed_all(force).await?;
    let stats = indexer.stats().await?;

    println!("embed{}", if force { " (rebuild)" } else { "" });
    println!("  model: {}", model_name);
    println!("  new conversation topics: {}", report.conversations);
    println!("  new message chunks: {}", report.messages);
    println!(
        "  totals: {} topics, {} message chunks",
        stats.conversation_topics, stats.message_chunks
    );
    println!("ok");

    pool.close().await;
    Ok(())
}
