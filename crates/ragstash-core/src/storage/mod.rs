//! Storage backends for Ragstash.
//!
//! Every backend implements [`RagBackend`]. The set of backends is closed:
//! [`Backend`] holds one variant per store and forwards each call to it, so a
//! provider tag is bound to its implementation at compile time.
//!
//! The `LanceDB` tag is served by [`LanceDbBackend`] when the `lancedb`
//! feature is enabled. Without it the tag falls back to [`SqliteBackend`], an
//! embedded vector index with the same directory-per-store contract.

#[cfg(feature = "lancedb")]
pub mod lance;
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod schema;
pub mod sqlite;

#[cfg(feature = "lancedb")]
pub use lance::LanceDbBackend;
pub use memory::MemoryBackend;
#[cfg(feature = "mongodb")]
pub use mongo::MongoBackend;
pub use sqlite::SqliteBackend;

use crate::chunk::chunk_words;
use crate::config::{validate_index_name, BackendSpec, Settings};
use crate::error::{Error, Result};
use crate::extract::extract_text;
use crate::models::{Document, IngestionTask, ScoredDocument};
use crate::provider::Provider;
use async_trait::async_trait;
use std::path::Path;

/// The contract every backend honors.
#[async_trait]
pub trait RagBackend: Send + Sync + std::fmt::Debug {
    /// The provider this backend was built for.
    fn provider(&self) -> Provider;

    /// Index declared when the backend was created.
    fn default_index(&self) -> &str;

    /// Store a document.
    ///
    /// Never fails: unsupported content and store failures come back as a
    /// task with status `ERROR`. A document's chunks become visible to
    /// queries all at once or not at all.
    async fn ingest(&self, document: &Document) -> IngestionTask;

    /// Run a similarity query against `index`.
    ///
    /// Hits are sorted by descending score. An index with no hits above the
    /// relevance floor yields an empty list; an index that was never declared
    /// or populated yields [`Error::IndexNotFound`].
    async fn retrieve(&self, query: &str, index: &str) -> Result<Vec<ScoredDocument>>;
}

/// A live backend instance, one variant per store.
#[derive(Debug)]
pub enum Backend {
    #[cfg(feature = "lancedb")]
    Lance(LanceDbBackend),
    Sqlite(SqliteBackend),
    #[cfg(feature = "mongodb")]
    Mongo(MongoBackend),
    Memory(MemoryBackend),
}

impl Backend {
    /// Build the backend described by a validated spec.
    pub async fn connect(spec: &BackendSpec, settings: &Settings) -> Result<Self> {
        match spec {
            #[cfg(feature = "lancedb")]
            BackendSpec::LanceDb(params) => {
                Ok(Backend::Lance(LanceDbBackend::open(params, settings).await?))
            }
            #[cfg(not(feature = "lancedb"))]
            BackendSpec::LanceDb(params) => {
                Ok(Backend::Sqlite(SqliteBackend::open(params, settings).await?))
            }
            #[cfg(feature = "mongodb")]
            BackendSpec::MongoDb(params) => {
                Ok(Backend::Mongo(MongoBackend::connect(params, settings).await?))
            }
            #[cfg(not(feature = "mongodb"))]
            BackendSpec::MongoDb(_) => Err(Error::invalid_config(
                "MongoDB support not enabled. Enable with 'mongodb' feature.",
            )),
            BackendSpec::Memory(params) => Ok(Backend::Memory(MemoryBackend::new(params, settings))),
        }
    }
}

#[async_trait]
impl RagBackend for Backend {
    fn provider(&self) -> Provider {
        match self {
            #[cfg(feature = "lancedb")]
            Backend::Lance(b) => b.provider(),
            Backend::Sqlite(b) => b.provider(),
            #[cfg(feature = "mongodb")]
            Backend::Mongo(b) => b.provider(),
            Backend::Memory(b) => b.provider(),
        }
    }

    fn default_index(&self) -> &str {
        match self {
            #[cfg(feature = "lancedb")]
            Backend::Lance(b) => b.default_index(),
            Backend::Sqlite(b) => b.default_index(),
            #[cfg(feature = "mongodb")]
            Backend::Mongo(b) => b.default_index(),
            Backend::Memory(b) => b.default_index(),
        }
    }

    async fn ingest(&self, document: &Document) -> IngestionTask {
        match self {
            #[cfg(feature = "lancedb")]
            Backend::Lance(b) => b.ingest(document).await,
            Backend::Sqlite(b) => b.ingest(document).await,
            #[cfg(feature = "mongodb")]
            Backend::Mongo(b) => b.ingest(document).await,
            Backend::Memory(b) => b.ingest(document).await,
        }
    }

    async fn retrieve(&self, query: &str, index: &str) -> Result<Vec<ScoredDocument>> {
        match self {
            #[cfg(feature = "lancedb")]
            Backend::Lance(b) => b.retrieve(query, index).await,
            Backend::Sqlite(b) => b.retrieve(query, index).await,
            #[cfg(feature = "mongodb")]
            Backend::Mongo(b) => b.retrieve(query, index).await,
            Backend::Memory(b) => b.retrieve(query, index).await,
        }
    }
}

/// Extracted text of a document and its chunks.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Prepared {
    pub text: String,
    pub chunks: Vec<String>,
}

/// Turn a document into chunks ready for storage in `index`.
pub(crate) fn prepare(document: &Document, index: &str, settings: &Settings) -> Result<Prepared> {
    validate_index_name(index)?;
    let text = extract_text(&document.bytes, &document.content_type)?;
    let chunks = chunk_words(&text, settings.chunk_size, settings.chunk_overlap);
    if chunks.is_empty() {
        return Err(Error::unsupported("document contains no text"));
    }
    Ok(Prepared { text, chunks })
}

/// Create the store directory, rejecting paths that can never hold one.
pub(crate) fn ensure_directory(dir: &Path) -> Result<()> {
    if let Some(existing) = dir.ancestors().find(|p| p.exists()) {
        if !existing.is_dir() {
            return Err(Error::invalid_config(format!(
                "`path` {} is not a directory ({} is a file)",
                dir.display(),
                existing.display()
            )));
        }
    }

    std::fs::create_dir_all(dir).map_err(|e| {
        Error::unavailable(format!("Cannot create index directory {}: {}", dir.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryParams;
    use assert_matches::assert_matches;

    #[test]
    fn test_prepare() {
        let settings = Settings {
            chunk_size: 2,
            chunk_overlap: 0,
            ..Settings::default()
        };
        let prepared = prepare(&Document::text("one two three"), "default", &settings).unwrap();
        assert_eq!(prepared.text, "one two three");
        assert_eq!(prepared.chunks, vec!["one two", "three"]);
    }

    #[test]
    fn test_prepare_rejects_bad_index() {
        let settings = Settings::default();
        assert_matches!(
            prepare(&Document::text("hello"), "no spaces allowed", &settings),
            Err(Error::InvalidConfiguration(_))
        );
    }

    #[tokio::test]
    async fn test_enum_dispatch() {
        let spec = BackendSpec::Memory(MemoryParams::default());
        let backend = Backend::connect(&spec, &Settings::default()).await.unwrap();
        assert_eq!(backend.provider(), Provider::Memory);
        assert_eq!(backend.default_index(), "default");

        let task = backend.ingest(&Document::text("hello world")).await;
        assert!(task.is_done());
        let hits = backend.retrieve("hello", "default").await.unwrap();
        assert_eq!(hits[0].text, "hello world");
    }

    #[test]
    fn test_ensure_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_directory(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_directory(&nested).unwrap();

        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "not a directory").unwrap();
        assert_matches!(ensure_directory(&file), Err(Error::InvalidConfiguration(_)));
        assert_matches!(
            ensure_directory(&file.join("below")),
            Err(Error::InvalidConfiguration(_))
        );
    }
}
