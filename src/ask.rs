//! `recall ask`: answer a question grounded in retrieved conversations.

use std::sync::Arc;

use anyhow::{bail, Result};

use chat_recall_core::rag::{GenerationBackend, RagOptions, RagPipeline, RagResponse};
use chat_recall_core::search::SearchFilters;

use crate::config::Config;
use crate::db;
use crate::generation::create_backend;
use crate::rerank::create_reranker;
use crate::search::build_engine;

pub struct AskArgs {
    pub question: String,
    pub limit: Option<usize>,
    pub filters: SearchFilters,
    pub rerank: bool,
}

pub async fn run_ask(config: &Config, args: AskArgs) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Answering requires embeddings. Set [embedding] provider in config.");
    }

    let backend: Arc<dyn GenerationBackend> = create_backend(&config.generation)?.into();
    if !backend.is_available().await {
        match backend.name() {
            "claude" => bail!("Generation backend 'claude' needs ANTHROPIC_API_KEY"),
            name => bail!(
                "Generation backend '{}' is not reachable at {}",
                name,
                config.generation.url
            ),
        }
    }

    let pool = db::connect(config).await?;
    let engine = build_engine(config, &pool).await?;

    let options = RagOptions {
        n_results: args.limit.unwrap_or(config.retrieval.n_results),
        max_context_tokens: config.retrieval.max_context_tokens,
        filters: args.filters,
    };
    let mut pipeline = RagPipeline::new(Arc::new(engine), backend, options);
    if args.rerank || config.retrieval.rerank {
        pipeline = pipeline.with_reranker(Arc::new(create_reranker(&config.reranker)?));
    }

    let response = pipeline.query(&args.question, &[]).await?;
    print!("{}", format_response(&response));

    pool.close().await;
    Ok(())
}

pub fn format_response(response: &RagResponse) -> String {
    let mut out = format!("{}\n", response.answer.trim_end());
    if response.sources.is_empty() {
        return out;
    }
    out.push_str("\nSources:\n");
    for (i, source) in response.sources.iter().enumerate() {
        let name = if source.conversation_name.is_empty() {
            "Untitled"
        } else {
            &source.conversation_name
        };
        out.push_str(&format!("  [{}] {} ({})\n", i + 1, name, source.source_id));
    }
    out
}
