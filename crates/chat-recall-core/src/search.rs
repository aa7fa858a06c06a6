//! Query-time retrieval: keyword, semantic, hybrid, and reranked search.
//!
//! # Methods
//!
//! | Method | Source | Score |
//! |--------|--------|-------|
//! | keyword | [`LexicalIndex`] over message text | `0.0` placeholder; rank is what counts |
//! | semantic | both vector collections | cosine distance, ascending |
//! | hybrid | RRF over keyword + semantic | fused score, descending |
//! | reranked | hybrid, then cross-encoder | model score, descending |
//!
//! Keyword search is best-effort: any index error is logged and yields an
//! empty list. Semantic search propagates embedding and store errors.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::embedding::embed_query;
use crate::fusion::{reciprocal_rank_fusion, RRF_K};
use crate::index::Indexer;
use crate::models::{Collection, SearchResult};
use crate::rerank::Reranker;
use crate::store::{Field, LexicalIndex, Predicate, TextMatch};

/// Optional attribute filters for semantic retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub source_id: Option<String>,
    pub sender: Option<String>,
    /// Inclusive lower bound on the creation timestamp.
    pub date_from: Option<String>,
    /// Inclusive upper bound on the creation timestamp.
    pub date_to: Option<String>,
}

impl SearchFilters {
    /// Translate into a store predicate. A single condition is returned as
    /// is; several are conjoined.
    pub fn to_predicate(&self) -> Option<Predicate> {
        let mut conditions = Vec::new();
        if let Some(source) = &self.source_id {
            conditions.push(Predicate::Eq(Field::SourceId, source.clone()));
        }
        if let Some(sender) = &self.sender {
            conditions.push(Predicate::Eq(Field::Sender, sender.clone()));
        }
        if let Some(from) = &self.date_from {
            conditions.push(Predicate::Gte(Field::Date, from.clone()));
        }
        if let Some(to) = &self.date_to {
            conditions.push(Predicate::Lte(Field::Date, to.clone()));
        }

        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(Predicate::And(conditions)),
        }
    }
}

/// The ranked-candidate producers that feed fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retriever {
    Semantic,
    Lexical,
}

impl Retriever {
    /// Order in which hybrid search feeds lists to fusion. The first list
    /// supplies representatives for keys found by both.
    pub const HYBRID: [Retriever; 2] = [Retriever::Semantic, Retriever::Lexical];

    pub async fn retrieve(
        &self,
        engine: &SearchEngine,
        query: &str,
        n: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        match self {
            Retriever::Semantic => engine.semantic_search(query, n, filters).await,
            Retriever::Lexical => Ok(engine.keyword_search(query, n).await),
        }
    }
}

pub struct SearchEngine {
    indexer: Arc<Indexer>,
    lexical: Arc<dyn LexicalIndex>,
}

impl SearchEngine {
    pub fn new(indexer: Arc<Indexer>, lexical: Arc<dyn LexicalIndex>) -> Self {
        Self { indexer, lexical }
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    /// Full-text search over message text. Never fails: index errors are
    /// logged and produce an empty list.
    pub async fn keyword_search(&self, query: &str, n: usize) -> Vec<SearchResult> {
        let Some(text_match) = TextMatch::from_query(query) else {
            return Vec::new();
        };
        match self.lexical.full_text_search(&text_match, n).await {
            Ok(rows) => rows.into_iter().map(SearchResult::from_lexical).collect(),
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), query, "keyword search failed");
                Vec::new()
            }
        }
    }

    /// Nearest chunks across both collections, ascending by distance and
    /// de-duplicated by [`SearchResult::dedup_key`].
    pub async fn semantic_search(
        &self,
        query: &str,
        n: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        let predicate = filters.to_predicate();
        let query_vec = embed_query(self.indexer.embedder(), query).await?;

        let mut merged: Vec<SearchResult> = Vec::new();
        for collection in Collection::ALL {
            let hits = self
                .indexer
                .nearest(&query_vec, collection, n, predicate.as_ref())
                .await?;
            merged.extend(hits.into_iter().map(SearchResult::from_hit));
        }

        merged.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut seen = HashSet::new();
        merged.retain(|r| seen.insert(r.dedup_key().to_string()));
        merged.truncate(n);
        Ok(merged)
    }

    /// Fuse semantic and keyword rankings with RRF, `2n` candidates each.
    pub async fn hybrid_search(
        &self,
        query: &str,
        n: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        let mut lists = Vec::with_capacity(Retriever::HYBRID.len());
        for retriever in Retriever::HYBRID {
            lists.push(retriever.retrieve(self, query, n.saturating_mul(2), filters).await?);
        }
        let mut fused = reciprocal_rank_fusion(&lists, RRF_K);
        fused.truncate(n);
        Ok(fused)
    }

    /// Hybrid search over `4n` candidates, cut to `n` by the cross-encoder
    /// when one is given.
    pub async fn reranked_search(
        &self,
        query: &str,
        n: usize,
        filters: &SearchFilters,
        reranker: Option<&Reranker>,
    ) -> Result<Vec<SearchResult>> {
        let candidates = self.hybrid_search(query, n.saturating_mul(4), filters).await?;
        match reranker {
            Some(reranker) => reranker.rerank(query, candidates, n).await,
            None => Ok(candidates.into_iter().take(n).collect()),
        }
    }
}
