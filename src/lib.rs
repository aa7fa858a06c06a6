//! # Chat Recall
//!
//! Local hybrid search and grounded answers over an archive of past AI
//! conversations.
//!
//! The retrieval pipeline itself (chunking, indexing, fusion, reranking,
//! context assembly) lives in `chat-recall-core`. This crate wires it to
//! SQLite, embedding providers, a local cross-encoder and Ollama, and
//! exposes the `recall` CLI.
//!
//! ```text
//! archive.json ──import──▶ SQLite (messages + FTS5)
//!                                │
//!                          embed │
//!                                ▼
//!                  vector_records (topics, message chunks)
//!                                │
//!         search ◀── keyword + semantic ──RRF──▶ [rerank] ──▶ ask (Ollama)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Content, vector and lexical stores over SQLite |
//! | [`ingest`] | Archive import |
//! | [`embedding`] | Embedding providers |
//! | [`rerank`] | fastembed cross-encoder |
//! | [`generation`] | Ollama chat backend |
//! | [`embed_cmd`] | `recall embed` |
//! | [`search`] | `recall search` |
//! | [`ask`] | `recall ask` |
//! | [`stats`] | `recall stats` |
//! | [`progress`] | Embed progress on stderr |

pub mod ask;
pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod generation;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod rerank;
pub mod search;
pub mod sqlite_store;
pub mod stats;
