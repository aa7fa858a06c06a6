//! Cross-encoder backed by fastembed's `TextRerank`.
//!
//! [`create_reranker`] returns an unloaded core [`Reranker`]. The model is
//! downloaded and loaded on the first non-empty rerank call, on tokio's
//! blocking pool like the local embedding provider.

use anyhow::Result;

use chat_recall_core::rerank::Reranker;

use crate::config::RerankerConfig;

#[cfg(feature = "local-models-fastembed")]
mod fastembed_encoder {
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, bail, Result};
    use async_trait::async_trait;
    use chat_recall_core::error::RecallError;
    use chat_recall_core::rerank::CrossEncoder;

    /// fastembed `TextRerank`, loaded inside the blocking pool on the
    /// first scoring call and kept for later ones.
    pub struct FastembedCrossEncoder {
        name: String,
        model: Arc<Mutex<Option<fastembed::TextRerank>>>,
    }

    impl FastembedCrossEncoder {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                model: Default::default(),
            }
        }
    }

    fn load(name: &str) -> Result<fastembed::TextRerank> {
        let options = fastembed::RerankInitOptions::new(reranker_model(name)?)
            .with_show_download_progress(true);
        fastembed::TextRerank::try_new(options).map_err(|e| {
            RecallError::ModelLoad(format!("reranker '{}': {}", name, e)).into()
        })
    }

    #[async_trait]
    impl CrossEncoder for FastembedCrossEncoder {
        async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
            let slot = self.model.clone();
            let name = self.name.clone();
            let query = query.to_string();
            let documents = documents.to_vec();

            tokio::task::spawn_blocking(move || {
                let mut guard = slot
                    .lock()
                    .map_err(|_| anyhow!("reranker model lock poisoned"))?;
                if guard.is_none() {
                    *guard = Some(load(&name)?);
                }
                let model = guard
                    .as_mut()
                    .ok_or_else(|| anyhow!("reranker model not loaded"))?;

                let docs: Vec<&str> = documents.iter().map(String::as_str).collect();
                let results = model
                    .rerank(query.as_str(), docs, false, None)
                    .map_err(|e| anyhow!("Reranking failed: {}", e))?;

                // Results come back sorted by score; restore input order.
                let mut scores = vec![f32::NEG_INFINITY; documents.len()];
                for result in results {
                    if let Some(entry) = scores.get_mut(result.index) {
                        *entry = result.score;
                    }
                }
                Ok(scores)
            })
            .await?
        }
    }

    pub fn reranker_model(name: &str) -> Result<fastembed::RerankerModel> {
        match name {
            "bge-reranker-base" => Ok(fastembed::RerankerModel::BGERerankerBase),
            "bge-reranker-v2-m3" => Ok(fastembed::RerankerModel::BGERerankerV2M3),
            "jina-reranker-v1-turbo-en" => Ok(fastembed::RerankerModel::JINARerankerV1TurboEn),
            other => bail!(
                "Unknown reranker model: '{}'. Supported models: \
                 bge-reranker-base, bge-reranker-v2-m3, jina-reranker-v1-turbo-en",
                other
            ),
        }
    }
}

/// Build a lazily loaded reranker for `config.model`.
#[cfg(feature = "local-models-fastembed")]
pub fn create_reranker(config: &RerankerConfig) -> Result<Reranker> {
    use chat_recall_core::rerank::CrossEncoder;
    use fastembed_encoder::{reranker_model, FastembedCrossEncoder};

    reranker_model(&config.model)?;
    let name = config.model.clone();
    Ok(Reranker::new(move || {
        Ok(Box::new(FastembedCrossEncoder::new(&name)) as Box<dyn CrossEncoder>)
    }))
}

#[cfg(not(feature = "local-models-fastembed"))]
pub fn create_reranker(config: &RerankerConfig) -> Result<Reranker> {
    anyhow::bail!(
        "Reranker '{}' requires --features local-models-fastembed",
        config.model
    )
}

#[cfg(all(test, feature = "local-models-fastembed"))]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_rejected_without_loading() {
        let config = RerankerConfig {
            model: "not-a-reranker".into(),
        };
        assert!(create_reranker(&config).is_err());
    }

    #[test]
    fn test_known_model_starts_unloaded() {
        let reranker = create_reranker(&RerankerConfig::default()).unwrap();
        assert!(!reranker.is_loaded());
    }

    #[tokio::test]
    async fn test_scoring_works_on_current_thread_runtime() {
        use chat_recall_core::error::RecallError;
        use chat_recall_core::models::SearchResult;
        use chat_recall_core::rerank::CrossEncoder;
        use fastembed_encoder::FastembedCrossEncoder;

        // An unknown name fails inside the blocking task before any download.
        let reranker = Reranker::new(|| {
            Ok(Box::new(FastembedCrossEncoder::new("not-a-reranker")) as Box<dyn CrossEncoder>)
        });
        let candidate = SearchResult {
            conversation_id: "c".into(),
            message_id: "m".into(),
            conversation_name: String::new(),
            text: "index funds".into(),
            score: 0.0,
            source_id: String::new(),
            sender: String::new(),
            created_at: String::new(),
        };

        let err = reranker.rerank("funds", vec![candidate], 1).await.unwrap_err();
        assert!(err.to_string().contains("Unknown reranker model"));
        assert!(err.downcast_ref::<RecallError>().is_none());
    }
}
