//! Cross-encoder reranking of fused candidates.
//!
//! A cross-encoder reads the query and a candidate together and emits one
//! relevance scalar, which is sharper than either retrieval signal but far
//! too slow to run over the whole archive. [`Reranker`] therefore only sees
//! the short list produced by fusion.
//!
//! The encoder is constructed on first use and then owned by the `Reranker`:
//!
//! ```text
//! Unloaded ──first non-empty rerank──► Loaded(encoder)
//! ```
//!
//! A failed construction leaves the state `Unloaded`, so the next call
//! retries.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::error::RecallError;
use crate::models::SearchResult;

/// A model scoring (query, document) pairs; higher is more relevant.
///
/// Implementations backed by in-process inference run it off the async
/// executor (e.g. on tokio's blocking pool).
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;
}

type Loader = Box<dyn Fn() -> Result<Box<dyn CrossEncoder>> + Send + Sync>;

enum ModelState {
    Unloaded,
    Loaded(Arc<dyn CrossEncoder>),
}

pub struct Reranker {
    state: Mutex<ModelState>,
    loader: Loader,
}

impl Reranker {
    /// Create an unloaded reranker that calls `loader` on first use.
    ///
    /// The loader runs on the calling task and should only construct the
    /// encoder; weight loading belongs in [`CrossEncoder::score`].
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Box<dyn CrossEncoder>> + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(ModelState::Unloaded),
            loader: Box::new(loader),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state
            .lock()
            .map(|s| matches!(*s, ModelState::Loaded(_)))
            .unwrap_or(false)
    }

    fn encoder(&self) -> Result<Arc<dyn CrossEncoder>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("reranker state lock poisoned"))?;
        match &*state {
            ModelState::Loaded(encoder) => Ok(encoder.clone()),
            ModelState::Unloaded => {
                let encoder: Arc<dyn CrossEncoder> = (self.loader)()
                    .map_err(|e| RecallError::ModelLoad(format!("{:#}", e)))?
                    .into();
                tracing::info!("cross-encoder loaded");
                *state = ModelState::Loaded(encoder.clone());
                Ok(encoder)
            }
        }
    }

    /// Rescore `candidates` against `query` and return the best `top_k`,
    /// each carrying the model score.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<SearchResult>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let encoder = self.encoder()?;
        let documents: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let scores = encoder.score(query, &documents).await?;
        if scores.len() != candidates.len() {
            return Err(anyhow!(
                "cross-encoder returned {} scores for {} candidates",
                scores.len(),
                candidates.len()
            ));
        }

        let mut scored: Vec<SearchResult> = candidates
            .into_iter()
            .zip(scores)
            .map(|(mut result, score)| {
                result.score = score as f64;
                result
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Scores a document by how many query words it contains.
    struct WordOverlap;

    #[async_trait]
    impl CrossEncoder for WordOverlap {
        async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
            Ok(documents
                .iter()
                .map(|d| query.split_whitespace().filter(|w| d.contains(w)).count() as f32)
                .collect())
        }
    }

    fn candidate(id: &str, text: &str) -> SearchResult {
        SearchResult {
            conversation_id: "c".into(),
            message_id: id.into(),
            conversation_name: String::new(),
            text: text.into(),
            score: 0.5,
            source_id: String::new(),
            sender: String::new(),
            created_at: String::new(),
        }
    }

    fn counting_reranker(loads: Arc<AtomicUsize>) -> Reranker {
        Reranker::new(move || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(WordOverlap) as Box<dyn CrossEncoder>)
        })
    }

    #[tokio::test]
    async fn test_empty_input_does_not_load_model() {
        let loads = Arc::new(AtomicUsize::new(0));
        let reranker = counting_reranker(loads.clone());
        assert!(reranker.rerank("q", Vec::new(), 5).await.unwrap().is_empty());
        assert!(!reranker.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rerank_orders_by_model_score_and_truncates() {
        let loads = Arc::new(AtomicUsize::new(0));
        let reranker = counting_reranker(loads.clone());
        let candidates = vec![
            candidate("a", "nothing relevant"),
            candidate("b", "index funds and fees"),
            candidate("c", "index only"),
        ];
        let out = reranker
            .rerank("index funds fees", candidates, 2)
            .await
            .unwrap();
        let ids: Vec<&str> = out.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(out[0].score, 3.0);
        assert!(reranker.is_loaded());

        reranker
            .rerank("x", vec![candidate("d", "x")], 1)
            .await
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_failure_stays_unloaded() {
        let reranker = Reranker::new(|| Err(anyhow!("weights not found")));
        let err = reranker
            .rerank("q", vec![candidate("a", "text")], 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RecallError>(),
            Some(RecallError::ModelLoad(_))
        ));
        assert!(!reranker.is_loaded());
    }
}
