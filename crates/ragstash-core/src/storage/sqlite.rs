//! Embedded on-disk vector index backed by SQLite.
//!
//! Serves the `LanceDB` tag in builds without the `lancedb` feature. Each
//! backend owns one database file, `<path>/ragstash.sqlite3`, with two
//! tables: `indexes` lists the declared indexes and their embedding
//! dimension, `chunks` holds chunk text next to its embedding. Retrieval is a
//! brute-force cosine scan over the chunks of one index.

use super::schema::{chunks, indexes};
use super::{ensure_directory, prepare, RagBackend};
use crate::config::{LanceDbParams, Settings};
use crate::embed::{cosine_similarity, decode_vector, encode_vector, HashingEmbedder};
use crate::error::{Error, Result};
use crate::models::{rank, Document, IngestionTask, ScoredDocument};
use crate::provider::Provider;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// File name of the database inside the configured directory.
pub const DATABASE_FILE: &str = "ragstash.sqlite3";

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS indexes (
        name TEXT PRIMARY KEY NOT NULL,
        dimension INTEGER NOT NULL,
        created_at TIMESTAMP NOT NULL
    );
    CREATE TABLE IF NOT EXISTS chunks (
        id TEXT PRIMARY KEY NOT NULL,
        index_name TEXT NOT NULL REFERENCES indexes(name),
        document_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        text TEXT NOT NULL,
        embedding BLOB NOT NULL,
        created_at TIMESTAMP NOT NULL
    );
    CREATE INDEX IF NOT EXISTS chunks_index_name ON chunks(index_name);
";

#[derive(Insertable)]
#[diesel(table_name = indexes)]
struct NewIndexRow<'a> {
    name: &'a str,
    dimension: i32,
    created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = chunks)]
struct NewChunkRow<'a> {
    id: String,
    index_name: &'a str,
    document_id: &'a str,
    chunk_index: i32,
    text: &'a str,
    embedding: Vec<u8>,
    created_at: NaiveDateTime,
}

/// Per-connection SQLite setup.
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// A SQLite-backed vector index.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: Arc<SqlitePool>,
    path: PathBuf,
    default_index: String,
    embedder: HashingEmbedder,
    settings: Settings,
}

impl fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .field("default_index", &self.default_index)
            .field("dimension", &self.embedder.dimension())
            .finish()
    }
}

impl SqliteBackend {
    /// Open (or create) the index under `params.path` and declare the default index.
    pub async fn open(params: &LanceDbParams, settings: &Settings) -> Result<Self> {
        let dimension = params.dimension.unwrap_or(settings.embedding_dimension);
        let dir = params.path.clone();
        let default_index = params.index.clone();
        let pool_size = settings.pool_size;

        let pool = {
            let dir = dir.clone();
            let default_index = default_index.clone();
            tokio::task::spawn_blocking(move || {
                let pool = build_pool(&dir, pool_size)?;
                let mut conn = pool.get()?;
                conn.batch_execute(CREATE_TABLES)?;
                declare_index(&mut conn, &default_index, dimension)?;
                Ok::<_, Error>(pool)
            })
            .await??
        };

        log::debug!(
            "Opened vector index at {} (dimension {})",
            dir.display(),
            dimension
        );

        Ok(Self {
            pool: Arc::new(pool),
            path: dir,
            default_index,
            embedder: HashingEmbedder::new(dimension),
            settings: settings.clone(),
        })
    }

    /// Location of the database file.
    pub fn database_path(&self) -> PathBuf {
        self.path.join(DATABASE_FILE)
    }

    /// Run a blocking closure against a pooled connection.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PooledConnection<ConnectionManager<SqliteConnection>>) -> Result<T>
            + Send
            + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }

    /// Number of chunks stored under `index`.
    pub async fn chunk_count(&self, index: &str) -> Result<usize> {
        let index = index.to_string();
        let count = self
            .with_conn(move |conn| {
                chunks::table
                    .filter(chunks::index_name.eq(&index))
                    .count()
                    .get_result::<i64>(conn)
                    .map_err(Error::from)
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn store(&self, index: &str, document_id: &str, texts: Vec<String>) -> Result<usize> {
        let embeddings: Vec<Vec<u8>> = texts
            .iter()
            .map(|t| encode_vector(&self.embedder.embed(t)))
            .collect();
        let index = index.to_string();
        let document_id = document_id.to_string();
        let dimension = self.embedder.dimension();

        self.with_conn(move |conn| {
            let now = Utc::now().naive_utc();
            let rows: Vec<NewChunkRow<'_>> = texts
                .iter()
                .zip(embeddings)
                .enumerate()
                .map(|(i, (text, embedding))| NewChunkRow {
                    id: Uuid::new_v4().to_string(),
                    index_name: &index,
                    document_id: &document_id,
                    chunk_index: i as i32,
                    text,
                    embedding,
                    created_at: now,
                })
                .collect();

            conn.transaction::<_, Error, _>(|conn| {
                declare_index(conn, &index, dimension)?;
                diesel::insert_into(chunks::table)
                    .values(&rows)
                    .execute(conn)
                    .map_err(Error::from)
            })
        })
        .await
    }
}

fn build_pool(dir: &Path, pool_size: u32) -> Result<SqlitePool> {
    ensure_directory(dir)?;

    let manager = ConnectionManager::<SqliteConnection>::new(dir.join(DATABASE_FILE).to_string_lossy());
    let pool = Pool::builder()
        .max_size(pool_size)
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)?;
    Ok(pool)
}

/// Declare `name` if it is new; an existing index must have the same dimension.
fn declare_index(conn: &mut SqliteConnection, name: &str, dimension: usize) -> Result<()> {
    let dimension = i32::try_from(dimension)
        .map_err(|_| Error::invalid_config(format!("Embedding dimension {} is too large", dimension)))?;

    diesel::insert_or_ignore_into(indexes::table)
        .values(&NewIndexRow {
            name,
            dimension,
            created_at: Utc::now().naive_utc(),
        })
        .execute(conn)?;

    let stored: i32 = indexes::table
        .find(name)
        .select(indexes::dimension)
        .first(conn)?;

    if stored != dimension {
        return Err(Error::invalid_config(format!(
            "Index '{}' stores {}-dimensional vectors, not {}",
            name, stored, dimension
        )));
    }
    Ok(())
}

#[async_trait]
impl RagBackend for SqliteBackend {
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
        let query_vector = self.embedder.embed(query);
        let index = index.to_string();

        let rows = self
            .with_conn(move |conn| {
                let declared = indexes::table
                    .find(&index)
                    .select(indexes::name)
                    .first::<String>(conn)
                    .optional()?;
                if declared.is_none() {
                    return Err(Error::IndexNotFound(index));
                }

                chunks::table
                    .filter(chunks::index_name.eq(&index))
                    .select((chunks::text, chunks::embedding))
                    .load::<(String, Vec<u8>)>(conn)
                    .map_err(Error::from)
            })
            .await?;

        let hits = rows
            .into_iter()
            .filter_map(|(text, blob)| {
                let vector = decode_vector(&blob)?;
                Some(ScoredDocument {
                    score: cosine_similarity(&query_vector, &vector),
                    text,
                })
            })
            .collect();

        Ok(rank(hits, self.settings.min_score, self.settings.top_k))
    }
}
