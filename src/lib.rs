//! # docask
//!
//! Single-document question answering: load one document, split it into
//! overlapping chunks, embed and index them, then answer questions strictly
//! from the chunks most similar to each question.
//!
//! ## Architecture
//!
//! ```text
//!  upload ─▶ Loader ─▶ Chunker ─▶ Embedding ─▶ VectorIndex ─▶ Session
//!                                                              │
//!  question ─▶ Retriever (embed query, top-K) ◀────────────────┘
//!                 │
//!                 ▼
//!            Synthesizer (grounding prompt ─▶ Generation) ─▶ answer
//! ```
//!
//! Exactly one document is active at a time. Every upload rebuilds the
//! index from scratch; a failed upload leaves no document active.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`loader`] | PDF / text / CSV loading |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding backends |
//! | [`generation`] | Text generation backends |
//! | [`index`] | Persisted vector index |
//! | [`session`] | The active index and its lock |
//! | [`indexer`] | Document → index rebuild |
//! | [`retriever`] | Query → top-K chunks |
//! | [`answer`] | Grounded prompt and answer |
//! | [`pipeline`] | Upload and question boundaries |
//! | [`server`] | HTTP API |

pub mod answer;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod indexer;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod port;
pub mod retriever;
pub mod server;
pub mod session;
