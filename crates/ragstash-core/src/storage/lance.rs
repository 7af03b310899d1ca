//! LanceDB vector store.
//!
//! A backend owns one LanceDB database directory. Every index is a Lance
//! table whose rows are chunks: `id`, `document_id`, `chunk_index`, `text`
//! and a fixed-size `vector` column. A document is appended as a single
//! record batch, which Lance commits as one table version.

use super::{ensure_directory, prepare, RagBackend};
use crate::config::{LanceDbParams, Settings};
use crate::embed::HashingEmbedder;
use crate::error::{Error, Result};
use crate::models::{rank, Document, IngestionTask, ScoredDocument};
use crate::provider::Provider;
use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_array::{Array, ArrayRef, Float32Array, RecordBatch, RecordBatchIterator, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

const VECTOR_COLUMN: &str = "vector";
const DISTANCE_COLUMN: &str = "_distance";

/// A LanceDB-backed vector store.
pub struct LanceDbBackend {
    connection: Connection,
    path: PathBuf,
    default_index: String,
    embedder: HashingEmbedder,
    settings: Settings,
    /// Open table handles, keyed by index name
    tables: RwLock<HashMap<String, Table>>,
}

impl fmt::Debug for LanceDbBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanceDbBackend")
            .field("path", &self.path)
            .field("default_index", &self.default_index)
            .field("dimension", &self.embedder.dimension())
            .finish()
    }
}

impl LanceDbBackend {
    /// Connect to the database under `params.path` and declare the default index.
    pub async fn open(params: &LanceDbParams, settings: &Settings) -> Result<Self> {
        let dimension = params.dimension.unwrap_or(settings.embedding_dimension);
        ensure_directory(&params.path)?;

        let uri = params.path.to_string_lossy().to_string();
        let connection = connect(&uri).execute().await?;

        let backend = Self {
            connection,
            path: params.path.clone(),
            default_index: params.index.clone(),
            embedder: HashingEmbedder::new(dimension),
            settings: settings.clone(),
            tables: RwLock::new(HashMap::new()),
        };
        backend.table(&params.index, true).await?;

        log::debug!(
            "Opened LanceDB store at {} (dimension {})",
            backend.path.display(),
            dimension
        );
        Ok(backend)
    }

    /// Number of chunks stored under `index`.
    pub async fn chunk_count(&self, index: &str) -> Result<usize> {
        match self.table(index, false).await? {
            Some(table) => Ok(table.count_rows(None).await?),
            None => Err(Error::IndexNotFound(index.to_string())),
        }
    }

    fn schema(&self) -> Result<SchemaRef> {
        Ok(Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("document_id", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                VECTOR_COLUMN,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    list_size(self.embedder.dimension())?,
                ),
                false,
            ),
        ])))
    }

    /// Table handle for `name`, opening it or (with `create`) creating it.
    async fn table(&self, name: &str, create: bool) -> Result<Option<Table>> {
        if let Some(table) = self.tables.read().await.get(name) {
            return Ok(Some(table.clone()));
        }

        let mut tables = self.tables.write().await;
        if let Some(table) = tables.get(name) {
            return Ok(Some(table.clone()));
        }

        let existing = self.connection.table_names().execute().await?;
        let table = if existing.iter().any(|t| t == name) {
            self.connection.open_table(name).execute().await?
        } else if create {
            match self
                .connection
                .create_empty_table(name, self.schema()?)
                .execute()
                .await
            {
                Ok(table) => table,
                // Another handle on the same directory got there first
                Err(err) => self
                    .connection
                    .open_table(name)
                    .execute()
                    .await
                    .map_err(|_| Error::from(err))?,
            }
        } else {
            return Ok(None);
        };

        self.check_dimension(name, &table).await?;
        tables.insert(name.to_string(), table.clone());
        Ok(Some(table))
    }

    async fn check_dimension(&self, name: &str, table: &Table) -> Result<()> {
        let schema = table.schema().await?;
        let stored = schema
            .field_with_name(VECTOR_COLUMN)
            .ok()
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            });

        match stored {
            Some(dimension) if dimension == self.embedder.dimension() => Ok(()),
            Some(dimension) => Err(Error::invalid_config(format!(
                "Index '{}' stores {}-dimensional vectors, not {}",
                name,
                dimension,
                self.embedder.dimension()
            ))),
            None => Err(Error::invalid_config(format!(
                "Table '{}' has no `{}` column",
                name, VECTOR_COLUMN
            ))),
        }
    }

    fn to_batch(&self, document_id: &str, texts: &[String]) -> Result<RecordBatch> {
        let dimension = self.embedder.dimension();
        let mut vectors = FixedSizeListBuilder::new(Float32Builder::new(), list_size(dimension)?);
        for text in texts {
            vectors.values().append_slice(&self.embedder.embed(text));
            vectors.append(true);
        }

        let ids: Vec<String> = texts.iter().map(|_| Uuid::new_v4().to_string()).collect();
        let document_ids: Vec<&str> = texts.iter().map(|_| document_id).collect();
        let positions = (0..texts.len())
            .map(u32::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::unsupported("document has too many chunks"))?;

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(document_ids)),
            Arc::new(UInt32Array::from(positions)),
            Arc::new(StringArray::from(texts.to_vec())),
            Arc::new(vectors.finish()),
        ];
        RecordBatch::try_new(self.schema()?, columns)
            .map_err(|e| Error::other(format!("Failed to build record batch: {}", e)))
    }

    async fn store(&self, index: &str, document_id: &str, texts: Vec<String>) -> Result<usize> {
        let table = self
            .table(index, true)
            .await?
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))?;

        let batch = self.to_batch(document_id, &texts)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table.add(Box::new(batches)).execute().await?;
        Ok(texts.len())
    }
}

fn list_size(dimension: usize) -> Result<i32> {
    i32::try_from(dimension)
        .map_err(|_| Error::invalid_config(format!("Embedding dimension {} is too large", dimension)))
}

/// Turn one result batch into hits, converting cosine distance to similarity.
fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<ScoredDocument>> {
    let texts = batch
        .column_by_name("text")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>());
    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let (Some(texts), Some(distances)) = (texts, distances) else {
        return Err(Error::other("LanceDB result is missing `text` or `_distance`"));
    };

    Ok((0..batch.num_rows())
        .filter(|&row| !texts.is_null(row) && !distances.is_null(row))
        .map(|row| ScoredDocument {
            text: texts.value(row).to_string(),
            score: 1.0 - distances.value(row),
        })
        .collect())
}

#[async_trait]
impl RagBackend for LanceDbBackend {
    fn provider(&self) -> Provider {
        Provider::LanceDb
    }

    fn default_index(&self) -> &str {
        &self.default_index
    }

    async fn ingest(&self, document: &Document) -> IngestionTask {
        let task = IngestionTask::pending(document.index_or(&self.default_index));
        let outcome = match prepare(document, &task.index, &self.settings) {
            Ok(prepared) => self.store(&task.index, &task.document_id, prepared.chunks).await,
            Err(err) => Err(err),
        };
        task.finish(outcome)
    }

    async fn retrieve(&self, query: &str, index: &str) -> Result<Vec<ScoredDocument>> {
        let Some(table) = self.table(index, false).await? else {
            return Err(Error::IndexNotFound(index.to_string()));
        };

        let query_vector = self.embedder.embed(query);
        // No known tokens: nothing can be similar
        if query_vector.iter().all(|v| *v == 0.0) {
            return Ok(Vec::new());
        }

        let mut results = table
            .vector_search(query_vector)?
            .distance_type(DistanceType::Cosine)
            .limit(self.settings.top_k)
            .execute()
            .await?;

        let mut hits = Vec::new();
        while let Some(batch) = results.try_next().await? {
            hits.extend(batch_to_hits(&batch)?);
        }

        Ok(rank(hits, self.settings.min_score, self.settings.top_k))
    }
}
