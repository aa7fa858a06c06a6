//! Retrieval-augmented generation.
//!
//! [`RagPipeline`] retrieves with hybrid (optionally reranked) search,
//! packs the results with [`build_context`], and hands the context, the
//! conversation so far, and [`SYSTEM_PROMPT`] to a [`GenerationBackend`].
//! The backend and all options are explicit constructor arguments.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{build_context, DEFAULT_MAX_CONTEXT_TOKENS};
use crate::models::SearchResult;
use crate::rerank::Reranker;
use crate::search::{SearchEngine, SearchFilters};

pub const SYSTEM_PROMPT: &str = "You are a personal knowledge assistant. You answer questions based on the \
user's past AI conversations. Always cite the conversation name and date \
when referencing specific information. If the context doesn't contain \
relevant information, say so honestly.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Turn {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Turn {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A text-generation service.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Answer the last turn. `context` is the retrieved context block, to be
    /// placed alongside the system prompt.
    async fn generate(&self, system: &str, turns: &[Turn], context: &str) -> Result<String>;

    async fn is_available(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RagOptions {
    pub n_results: usize,
    pub max_context_tokens: usize,
    pub filters: SearchFilters,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self {
            n_results: 10,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            filters: SearchFilters::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    pub answer: String,
    pub sources: Vec<SearchResult>,
}

pub struct RagPipeline {
    search: Arc<SearchEngine>,
    backend: Arc<dyn GenerationBackend>,
    reranker: Option<Arc<Reranker>>,
    options: RagOptions,
}

impl RagPipeline {
    pub fn new(
        search: Arc<SearchEngine>,
        backend: Arc<dyn GenerationBackend>,
        options: RagOptions,
    ) -> Self {
        Self {
            search,
            backend,
            reranker: None,
            options,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn backend(&self) -> &dyn GenerationBackend {
        self.backend.as_ref()
    }

    /// Retrieve context for `question` and generate an answer.
    pub async fn query(&self, question: &str, history: &[Turn]) -> Result<RagResponse> {
        let n = self.options.n_results;
        let sources = match &self.reranker {
            Some(reranker) => {
                self.search
                    .reranked_search(question, n, &self.options.filters, Some(reranker))
                    .await?
            }
            None => {
                self.search
                    .hybrid_search(question, n, &self.options.filters)
                    .await?
            }
        };
        let context = build_context(&sources, self.options.max_context_tokens);

        let mut turns = history.to_vec();
        turns.push(Turn::user(question));

        tracing::info!(
            backend = self.backend.name(),
            sources = sources.len(),
            history = history.len(),
            "generating answer"
        );
        let answer = self.backend.generate(SYSTEM_PROMPT, &turns, &context).await?;
        Ok(RagResponse { answer, sources })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::context::NO_CONTEXT;
    use crate::index::{IndexOptions, Indexer};
    use crate::test_support::{sample_store, HashEmbedder};

    /// Records what it was asked and echoes the context back.
    #[derive(Default)]
    struct EchoBackend {
        calls: Mutex<Vec<(String, Vec<Turn>, String)>>,
    }

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, system: &str, turns: &[Turn], context: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((system.to_string(), turns.to_vec(), context.to_string()));
            Ok(context.to_string())
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    async fn pipeline(backend: Arc<EchoBackend>, embed: bool) -> RagPipeline {
        let store = Arc::new(sample_store());
        let indexer = Indexer::open(
            store.clone(),
            store.clone(),
            Arc::new(HashEmbedder::new()),
            IndexOptions::default(),
        )
        .await
        .unwrap();
        if embed {
            indexer.embed_all(false).await.unwrap();
        }
        let search = Arc::new(SearchEngine::new(Arc::new(indexer), store));
        let options = RagOptions {
            n_results: 3,
            ..Default::default()
        };
        RagPipeline::new(search, backend, options)
    }

    #[tokio::test]
    async fn test_query_passes_context_and_history() {
        let backend = Arc::new(EchoBackend::default());
        let rag = pipeline(backend.clone(), true).await;
        let history = vec![
            Turn::user("I'm planning a trip"),
            Turn::assistant("Where to?"),
        ];

        let response = rag.query("Lisbon day trip ideas", &history).await.unwrap();

        assert!(!response.sources.is_empty());
        assert!(response.sources.len() <= 3);
        assert!(response.answer.starts_with("[1] Conversation: "));
        assert!(response.answer.contains("Trip planning"));

        let calls = backend.calls.lock().unwrap();
        let (system, turns, _) = &calls[0];
        assert_eq!(system, SYSTEM_PROMPT);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[2], Turn::user("Lisbon day trip ideas"));
    }

    #[tokio::test]
    async fn test_query_without_index_uses_sentinel_context() {
        let backend = Arc::new(EchoBackend::default());
        let rag = pipeline(backend.clone(), false).await;
        // Nothing embedded and no keyword hits.
        let response = rag.query("quantum chromodynamics", &[]).await.unwrap();
        assert!(response.sources.is_empty());
        assert_eq!(response.answer, NO_CONTEXT);
    }
}
