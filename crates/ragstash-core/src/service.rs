//! RAG service: resolve an identity, then delegate to its backend.

use crate::config::RagConfig;
use crate::error::Result;
use crate::models::{Document, IngestionTask, RagId, ScoredDocument};
use crate::provider::Provider;
use crate::registry::Registry;
use crate::storage::RagBackend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Summary of a registered RAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagDescription {
    pub id: RagId,
    pub provider: Provider,
    pub default_index: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct RagService {
    registry: Arc<Registry>,
}

impl RagService {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn make_rag(&self, config: RagConfig) -> Result<RagId> {
        self.registry.create(config).await
    }

    pub async fn ingest_file(&self, id: &RagId, document: &Document) -> Result<IngestionTask> {
        let entry = self.registry.resolve(id).await?;
        let task = entry.backend.ingest(document).await;
        log::debug!(
            "Ingest into {} index '{}': {}",
            id,
            task.index,
            task.status
        );
        Ok(task)
    }

    pub async fn retrieve_query(&self, id: &RagId, index: &str, query: &str) -> Result<Vec<ScoredDocument>> {
        let entry = self.registry.resolve(id).await?;
        entry.backend.retrieve(query, index).await
    }

    /// Create a RAG and ingest one document into it.
    ///
    /// The RAG stays registered even when the ingest fails; the task reports
    /// the failure.
    pub async fn make_rag_with_file(&self, config: RagConfig, document: &Document) -> Result<(RagId, IngestionTask)> {
        let id = self.make_rag(config).await?;
        let task = self.ingest_file(&id, document).await?;
        Ok((id, task))
    }

    pub async fn describe(&self, id: &RagId) -> Result<RagDescription> {
        let entry = self.registry.resolve(id).await?;
        Ok(RagDescription {
            id: entry.id.clone(),
            provider: entry.backend.provider(),
            default_index: entry.backend.default_index().to_string(),
            created_at: entry.created_at,
        })
    }

    pub fn providers(&self) -> &'static [Provider] {
        &Provider::ALL
    }

    /// Seconds since the UNIX epoch.
    pub fn heartbeat(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }
}

impl Default for RagService {
    fn default() -> Self {
        Self::new(Arc::new(Registry::default()))
    }
}
