//! Ragstash Core Library
//!
//! This crate keeps a registry of retrieval-augmented-generation (RAG)
//! backends. Each backend is created from a [`RagConfig`], bound to a freshly
//! minted [`RagId`], and then addressed by that identity to ingest documents
//! and answer similarity queries.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod chunk;
pub mod config;
pub mod embed;
pub mod error;
pub mod extract;
pub mod models;
pub mod provider;
pub mod registry;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use config::{
    load_settings, load_settings_from, settings_path, BackendSpec, LanceDbParams, MemoryParams,
    MongoDbParams, RagConfig, Settings, DEFAULT_INDEX,
};
pub use error::{Error, Result};
pub use extract::{content_type_for_path, extract_text};
pub use models::{Document, IngestionTask, RagId, ScoredDocument, TaskStatus};
pub use provider::Provider;
pub use registry::{RagEntry, Registry};
pub use service::{RagDescription, RagService};
pub use storage::{Backend, MemoryBackend, RagBackend, SqliteBackend};

#[cfg(feature = "lancedb")]
pub use storage::LanceDbBackend;
#[cfg(feature = "mongodb")]
pub use storage::MongoBackend;
