//! Data models for Ragstash

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identity of a registered RAG.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RagId(String);

impl RagId {
    /// Mint a fresh identity.
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RagId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RagId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle state of an ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Done,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Done => "DONE",
            TaskStatus::Error => "ERROR",
        })
    }
}

/// Outcome of one ingest call.
///
/// Built with [`IngestionTask::pending`] and moved to a terminal state by the
/// consuming [`IngestionTask::finish`], so a task can only be finished once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionTask {
    /// Destination index (table or collection).
    pub index: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Identity minted for the document; on ERROR nothing was stored under it.
    pub document_id: String,
    /// Chunks written for the document.
    pub chunks: usize,
}

impl IngestionTask {
    pub fn pending(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            status: TaskStatus::Pending,
            detail: None,
            document_id: Uuid::new_v4().to_string(),
            chunks: 0,
        }
    }

    /// Record the result of the write: `Ok(chunks)` or the failure.
    pub fn finish(mut self, outcome: Result<usize>) -> Self {
        match outcome {
            Ok(chunks) => {
                self.status = TaskStatus::Done;
                self.chunks = chunks;
            }
            Err(err) => {
                log::warn!("Ingestion into '{}' failed: {}", self.index, err);
                self.status = TaskStatus::Error;
                self.detail = Some(err.to_string());
            }
        }
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }
}

/// One query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub text: String,
    pub score: f32,
}

/// Raw content handed to a backend for ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub bytes: Vec<u8>,
    /// MIME type hint, e.g. `text/plain; charset=utf-8`.
    pub content_type: String,
    pub file_name: Option<String>,
    /// Target index; the backend's default index when `None`.
    pub index: Option<String>,
}

impl Document {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            file_name: None,
            index: None,
        }
    }

    /// Plain text document.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text.into().into_bytes(), "text/plain")
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// The explicit index, or `default`.
    pub fn index_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.index.as_deref().unwrap_or(default)
    }
}

/// Sort hits by descending score, drop those at or below `floor`, keep `limit`.
pub(crate) fn rank(mut hits: Vec<ScoredDocument>, floor: f32, limit: usize) -> Vec<ScoredDocument> {
    hits.retain(|hit| hit.score.is_finite() && hit.score > floor);
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_minted_ids_differ() {
        let a = RagId::mint();
        let b = RagId::mint();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_task_finish_done() {
        let task = IngestionTask::pending("default");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(!task.status.is_terminal());

        let task = task.finish(Ok(3));
        assert!(task.is_done());
        assert_eq!(task.chunks, 3);
        assert!(task.detail.is_none());
        assert!(!task.document_id.is_empty());
    }

    #[test]
    fn test_task_finish_error() {
        let task = IngestionTask::pending("default")
            .finish(Err(Error::unsupported("application/pdf")));
        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.status.is_terminal());
        assert!(task.detail.unwrap().contains("application/pdf"));
    }

    #[test]
    fn test_task_serializes_uppercase_status() {
        let task = IngestionTask::pending("default").finish(Ok(1));
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "DONE");
        assert_eq!(json["index"], "default");
        assert!(json.get("detail").is_none());
    }

    #[test]
    fn test_document_index_override() {
        let doc = Document::text("hello");
        assert_eq!(doc.index_or("default"), "default");
        let doc = doc.with_index("notes");
        assert_eq!(doc.index_or("default"), "notes");
    }

    #[test]
    fn test_rank_orders_filters_and_truncates() {
        let hits = vec![
            ScoredDocument { text: "low".into(), score: 0.1 },
            ScoredDocument { text: "zero".into(), score: 0.0 },
            ScoredDocument { text: "high".into(), score: 0.9 },
            ScoredDocument { text: "mid".into(), score: 0.5 },
            ScoredDocument { text: "nan".into(), score: f32::NAN },
        ];
        let ranked = rank(hits, 0.0, 2);
        let texts: Vec<_> = ranked.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["high", "mid"]);
    }
}
