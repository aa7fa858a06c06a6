//! `recall search`: run one retrieval method and print the ranked results.

use std::sync::Arc;

use anyhow::{bail, Result};
use sqlx::SqlitePool;

use chat_recall_core::embedding::EmbeddingProvider;
use chat_recall_core::models::SearchResult;
use chat_recall_core::search::{SearchEngine, SearchFilters};

use crate::config::Config;
use crate::db;
use crate::embed_cmd::open_indexer;
use crate::embedding;
use crate::rerank::create_reranker;
use crate::sqlite_store::SqliteStore;

const EXCERPT_CHARS: usize = 240;

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum SearchMode {
    Keyword,
    Semantic,
    Hybrid,
}

impl SearchMode {
    fn needs_embeddings(&self) -> bool {
        !matches!(self, SearchMode::Keyword)
    }
}

pub struct SearchArgs {
    pub query: String,
    pub mode: SearchMode,
    pub limit: Option<usize>,
    pub filters: SearchFilters,
    pub rerank: bool,
}

/// Build a [`SearchEngine`] over the SQLite store.
///
/// The disabled provider is allowed here; keyword search never embeds.
pub async fn build_engine(config: &Config, pool: &SqlitePool) -> Result<SearchEngine> {
    let provider: Arc<dyn EmbeddingProvider> = embedding::create_provider(&config.embedding)?.into();
    let indexer = open_indexer(config, pool, provider).await?;
    Ok(SearchEngine::new(
        Arc::new(indexer),
        Arc::new(SqliteStore::new(pool.clone())),
    ))
}

pub async fn run_search(config: &Config, args: SearchArgs) -> Result<()> {
    if args.query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    if args.mode.needs_embeddings() && !config.embedding.is_enabled() {
        bail!(
            "Mode '{:?}' requires embeddings. Set [embedding] provider in config.",
            args.mode
        );
    }
    if args.rerank && args.mode != SearchMode::Hybrid {
        bail!("--rerank only applies to hybrid search");
    }

    let pool = db::connect(config).await?;
    let engine = build_engine(config, &pool).await?;
    let n = args.limit.unwrap_or(config.retrieval.n_results);

    let results = match args.mode {
        SearchMode::Keyword => engine.keyword_search(&args.query, n).await,
        SearchMode::Semantic => engine.semantic_search(&args.query, n, &args.filters).await?,
        SearchMode::Hybrid if args.rerank || config.retrieval.rerank => {
            let reranker = create_reranker(&config.reranker)?;
            engine
                .reranked_search(&args.query, n, &args.filters, Some(&reranker))
                .await?
        }
        SearchMode::Hybrid => engine.hybrid_search(&args.query, n, &args.filters).await?,
    };

    if results.is_empty() {
        println!("No results.");
    } else {
        for (i, result) in results.iter().enumerate() {
            print!("{}", format_result(i + 1, result, args.mode));
        }
    }

    pool.close().await;
    Ok(())
}

/// Render one result. Keyword hits carry no meaningful score, so only
/// their rank is shown.
pub fn format_result(rank: usize, result: &SearchResult, mode: SearchMode) -> String {
    let name = if result.conversation_name.is_empty() {
        "(untitled)"
    } else {
        &result.conversation_name
    };
    let mut out = match mode {
        SearchMode::Keyword => format!("{}. {} / {}\n", rank, result.source_id, name),
        _ => format!(
            "{}. [{:.4}] {} / {}\n",
            rank, result.score, result.source_id, name
        ),
    };
    if !result.created_at.is_empty() {
        out.push_str(&format!("    date: {}\n", result.created_at));
    }
    if !result.sender.is_empty() {
        out.push_str(&format!("    sender: {}\n", result.sender));
    }
    out.push_str(&format!("    excerpt: \"{}\"\n", excerpt(&result.text)));
    out.push_str(&format!("    id: {}\n\n", result.dedup_key()));
    out
}

fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(message_id: &str, text: &str) -> SearchResult {
        SearchResult {
            conversation_id: "c1".into(),
            message_id: message_id.into(),
            conversation_name: "Budget".into(),
            text: text.into(),
            score: 0.0328,
            source_id: "claude".into(),
            sender: "assistant".into(),
            created_at: "2025-03-10T12:00:00Z".into(),
        }
    }

    #[test]
    fn test_keyword_results_hide_score() {
        let out = format_result(1, &result("m1", "hello"), SearchMode::Keyword);
        assert!(out.starts_with("1. claude / Budget\n"));
        assert!(out.contains("    id: m1\n"));
    }

    #[test]
    fn test_hybrid_results_show_score() {
        let out = format_result(2, &result("", "hello"), SearchMode::Hybrid);
        assert!(out.starts_with("2. [0.0328] claude / Budget\n"));
        // Conversation-level hits are identified by the conversation id.
        assert!(out.contains("    id: c1\n"));
    }

    #[test]
    fn test_excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("a\nb "), "a b");
        let long = "é".repeat(EXCERPT_CHARS + 10);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 3);
    }
}
