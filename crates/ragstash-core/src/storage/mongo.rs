//! MongoDB document store.
//!
//! Every ingest is a single BSON document (`insert_one` is atomic) in the
//! collection named after the target index. Collections carry a text index on
//! `text`, and retrieval is a `$text` search ranked by `textScore`.

use super::{prepare, RagBackend};
use crate::config::{MongoDbParams, Settings};
use crate::error::{Error, Result};
use crate::models::{rank, Document, IngestionTask, ScoredDocument};
use crate::provider::Provider;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, DateTime, Document as BsonDocument};
use mongodb::options::{ClientOptions, Credential, FindOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;

/// A MongoDB-backed document store.
///
/// The client connects lazily: creating the backend never touches the
/// network, so an unreachable server surfaces on the first ingest or query.
pub struct MongoBackend {
    database: Database,
    database_name: String,
    default_index: String,
    settings: Settings,
    /// Collections this backend has declared or written to.
    declared: RwLock<HashSet<String>>,
}

impl fmt::Debug for MongoBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoBackend")
            .field("database", &self.database_name)
            .field("default_index", &self.default_index)
            .finish()
    }
}

impl MongoBackend {
    pub async fn connect(params: &MongoDbParams, settings: &Settings) -> Result<Self> {
        let mut options = ClientOptions::parse(&params.uri)
            .await
            .map_err(|e| Error::invalid_config(format!("MongoDB parameters: `uri`: {}", e)))?;

        options.app_name = Some("ragstash".to_string());
        options.server_selection_timeout =
            Some(Duration::from_millis(settings.server_selection_timeout_ms));

        if let (Some(username), Some(password)) = (&params.username, &params.password) {
            let mut credential = Credential::default();
            credential.username = Some(username.clone());
            credential.password = Some(password.clone());
            options.credential = Some(credential);
        }

        let client = Client::with_options(options)
            .map_err(|e| Error::invalid_config(format!("MongoDB parameters: {}", e)))?;
        let database = client.database(&params.database);

        log::debug!(
            "Created MongoDB client for database '{}' (collection '{}')",
            params.database,
            params.collection
        );

        Ok(Self {
            database,
            database_name: params.database.clone(),
            default_index: params.collection.clone(),
            settings: settings.clone(),
            declared: RwLock::new(HashSet::from([params.collection.clone()])),
        })
    }

    fn collection(&self, index: &str) -> Collection<BsonDocument> {
        self.database.collection(index)
    }

    async fn store(&self, index: &str, document: &Document, document_id: &str, text: String, chunks: Vec<String>) -> Result<usize> {
        let collection = self.collection(index);

        // Idempotent: an existing identical index is a no-op on the server.
        let text_index = IndexModel::builder().keys(doc! { "text": "text" }).build();
        collection.create_index(text_index, None).await?;

        let count = chunks.len();
        let record = doc! {
            "_id": document_id,
            "index": index,
            "text": text,
            "chunks": chunks,
            "content_type": &document.content_type,
            "file_name": document.file_name.as_deref(),
            "created_at": DateTime::now(),
        };
        collection.insert_one(record, None).await?;

        self.declared.write().await.insert(index.to_string());
        Ok(count)
    }

    async fn is_declared(&self, index: &str) -> Result<bool> {
        if self.declared.read().await.contains(index) {
            return Ok(true);
        }

        // Collections written by another process or an earlier run.
        let names = self.database.list_collection_names(None).await?;
        let exists = names.iter().any(|name| name == index);
        if exists {
            self.declared.write().await.insert(index.to_string());
        }
        Ok(exists)
    }
}

#[async_trait]
impl RagBackend for MongoBackend {
    fn provider(&self) -> Provider {
        Provider::MongoDb
    }

    fn default_index(&self) -> &str {
        &self.default_index
    }

    async fn ingest(&self, document: &Document) -> IngestionTask {
        let task = IngestionTask::pending(document.index_or(&self.default_index));
        let outcome = match prepare(document, &task.index, &self.settings) {
            Ok(prepared) => {
                self.store(&task.index, document, &task.document_id, prepared.text, prepared.chunks)
                    .await
            }
            Err(err) => Err(err),
        };
        task.finish(outcome)
    }

    async fn retrieve(&self, query: &str, index: &str) -> Result<Vec<ScoredDocument>> {
        if !self.is_declared(index).await? {
            return Err(Error::IndexNotFound(index.to_string()));
        }
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let options = FindOptions::builder()
            .projection(doc! { "text": 1, "score": { "$meta": "textScore" } })
            .sort(doc! { "score": { "$meta": "textScore" } })
            .limit(self.settings.top_k as i64)
            .build();

        let filter = doc! { "$text": { "$search": query } };
        let mut cursor = match self.collection(index).find(filter, options).await {
            Ok(cursor) => cursor,
            // A declared collection that has not been written yet has no text index.
            Err(err) if is_missing_text_index(&err) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut hits = Vec::new();
        while let Some(record) = cursor.try_next().await? {
            let text = record.get_str("text").unwrap_or_default().to_string();
            let score = record.get_f64("score").unwrap_or_default() as f32;
            hits.push(ScoredDocument { text, score });
        }

        Ok(rank(hits, self.settings.min_score, self.settings.top_k))
    }
}

fn is_missing_text_index(err: &mongodb::error::Error) -> bool {
    // IndexNotFound
    matches!(
        err.kind.as_ref(),
        mongodb::error::ErrorKind::Command(cmd) if cmd.code == 27
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;
    use assert_matches::assert_matches;

    fn params(uri: &str) -> MongoDbParams {
        MongoDbParams {
            uri: uri.to_string(),
            database: "ragstash_test".to_string(),
            collection: "default".to_string(),
            username: None,
            password: None,
        }
    }

    fn fast_settings() -> Settings {
        Settings {
            server_selection_timeout_ms: 200,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_connect_is_lazy() {
        // Nothing listens on port 1; creation must still succeed.
        let backend = MongoBackend::connect(&params("mongodb://127.0.0.1:1"), &fast_settings())
            .await
            .unwrap();
        assert_eq!(backend.provider(), Provider::MongoDb);
        assert_eq!(backend.default_index(), "default");
    }

    #[tokio::test]
    async fn test_malformed_uri() {
        assert_matches!(
            MongoBackend::connect(&params("mongodb://127.0.0.1:notaport"), &fast_settings()).await,
            Err(Error::InvalidConfiguration(_))
        );
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let backend = MongoBackend::connect(&params("mongodb://127.0.0.1:1"), &fast_settings())
            .await
            .unwrap();

        let task = backend.ingest(&Document::text("hello world")).await;
        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.detail.unwrap().contains("Backend unavailable"));

        let err = backend.retrieve("hello", "other").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unsupported_content_skips_server() {
        let backend = MongoBackend::connect(&params("mongodb://127.0.0.1:1"), &fast_settings())
            .await
            .unwrap();
        let task = backend
            .ingest(&Document::new(vec![1, 2, 3], "application/octet-stream"))
            .await;
        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.detail.unwrap().contains("Unsupported content"));
    }
}
