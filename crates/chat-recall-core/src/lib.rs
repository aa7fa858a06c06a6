//! # chat-recall core
//!
//! Retrieval and context assembly over an archive of past AI
//! conversations: chunking, incremental vector indexing, keyword and
//! semantic search, Reciprocal Rank Fusion, cross-encoder reranking, and
//! token-budgeted context construction.
//!
//! Storage, embedding, reranking, and generation models are reached through
//! traits, so this crate has no tokio, sqlx, network, or filesystem
//! dependencies. The `chat-recall` crate supplies SQLite and model-backed
//! implementations.

pub mod chunk;
pub mod context;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod index;
pub mod models;
pub mod rag;
pub mod rerank;
pub mod search;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;
