//! Integration tests for the registry and the RAG service.

#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use ragstash_core::{
    Document, Error, RagConfig, RagId, RagService, Registry, Settings, TaskStatus,
};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

fn service() -> RagService {
    RagService::new(Arc::new(Registry::new(Settings::default())))
}

fn lancedb(dir: &TempDir) -> RagConfig {
    RagConfig::new("LanceDB").with_param("path", dir.path().to_string_lossy().to_string())
}

#[tokio::test]
async fn create_returns_fresh_resolvable_identities() {
    let service = service();
    let dir = TempDir::new().unwrap();

    let a = service.make_rag(RagConfig::new("Memory")).await.unwrap();
    let b = service.make_rag(lancedb(&dir)).await.unwrap();
    assert_ne!(a, b);

    assert!(service.registry().resolve(&a).await.is_ok());
    assert!(service.registry().resolve(&b).await.is_ok());
}

#[tokio::test]
async fn unknown_provider_leaves_registry_unchanged() {
    let service = service();
    let before = service.make_rag(RagConfig::new("Memory")).await.unwrap();

    assert_matches!(
        service.make_rag(RagConfig::new("Unsupported")).await,
        Err(Error::UnknownProvider(tag)) if tag == "Unsupported"
    );

    assert_eq!(service.registry().ids().await, vec![before.clone()]);
    assert!(service.registry().resolve(&before).await.is_ok());
}

#[tokio::test]
async fn invalid_parameters_are_rejected_before_minting() {
    let service = service();
    assert_matches!(
        service.make_rag(RagConfig::new("LanceDB")).await,
        Err(Error::InvalidConfiguration(_))
    );
    assert!(service.registry().is_empty().await);
}

#[tokio::test]
async fn resolving_unknown_identity_is_not_found() {
    let service = service();
    assert_matches!(
        service.registry().resolve(&RagId::from("nonexistent-id")).await,
        Err(Error::NotFound(id)) if id == "nonexistent-id"
    );
}

#[tokio::test]
async fn fresh_instance_has_empty_declared_index() {
    let service = service();
    let dir = TempDir::new().unwrap();

    for config in [RagConfig::new("Memory"), lancedb(&dir)] {
        let id = service.make_rag(config).await.unwrap();
        assert!(service
            .retrieve_query(&id, "default", "anything")
            .await
            .unwrap()
            .is_empty());
        assert_matches!(
            service.retrieve_query(&id, "undeclared", "anything").await,
            Err(Error::IndexNotFound(_))
        );
    }
}

#[tokio::test]
async fn ingest_then_query_ranks_matches() {
    let service = service();
    let dir = TempDir::new().unwrap();

    for config in [RagConfig::new("Memory"), lancedb(&dir)] {
        let id = service.make_rag(config).await.unwrap();
        for text in [
            "rust ownership and borrowing",
            "rust async runtimes",
            "baking sourdough bread",
        ] {
            let task = service.ingest_file(&id, &Document::text(text)).await.unwrap();
            assert_eq!(task.status, TaskStatus::Done);
        }

        let hits = service
            .retrieve_query(&id, "default", "rust borrowing")
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].text, "rust ownership and borrowing");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(hits.iter().all(|h| h.score > 0.0));
        assert!(hits.iter().all(|h| h.text != "baking sourdough bread"));
    }
}

#[tokio::test]
async fn lancedb_hello_world_scenario() {
    let service = service();
    let dir = TempDir::new().unwrap();

    let id = service.make_rag(lancedb(&dir)).await.unwrap();
    let task = service
        .ingest_file(&id, &Document::new(b"hello world".to_vec(), "text/plain"))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Done);
    assert_eq!(task.index, "default");

    let hits = service.retrieve_query(&id, "default", "hello").await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].text, "hello world");
    assert!(hits[0].score <= 1.0);
}

#[tokio::test]
async fn unsupported_content_is_reported_not_raised() {
    let service = service();
    let id = service.make_rag(RagConfig::new("Memory")).await.unwrap();

    let task = service
        .ingest_file(&id, &Document::new(vec![0x89, 0x50, 0x4e, 0x47], "image/png"))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Error);
    assert!(task.detail.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_never_collide() {
    let service = Arc::new(service());

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.make_rag(RagConfig::new("Memory")).await })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().unwrap());
    }
    assert_eq!(ids.len(), 50);
    assert_eq!(service.registry().len().await, 50);

    for id in &ids {
        assert!(service.registry().resolve(id).await.is_ok());
    }
}

#[tokio::test]
async fn ingest_into_named_index() {
    let service = service();
    let id = service.make_rag(RagConfig::new("Memory")).await.unwrap();

    let task = service
        .ingest_file(&id, &Document::text("quarterly report").with_index("finance"))
        .await
        .unwrap();
    assert_eq!(task.index, "finance");

    let hits = service.retrieve_query(&id, "finance", "report").await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn lancedb_path_that_is_a_file_is_invalid() {
    let service = service();
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("occupied");
    std::fs::write(&file, "not a directory").unwrap();

    let config = RagConfig::new("LanceDB").with_param("path", file.to_string_lossy().to_string());
    let err = service.make_rag(config).await.unwrap_err();
    assert_matches!(err, Error::InvalidConfiguration(_));
    assert_eq!(err.code(), "INVALID_CONFIGURATION");
    assert!(!err.is_retryable());
    assert!(service.registry().is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_lancedb_ingests_lose_nothing() {
    let settings = Settings {
        top_k: 64,
        ..Settings::default()
    };
    let service = Arc::new(RagService::new(Arc::new(Registry::new(settings))));
    let dir = TempDir::new().unwrap();
    let id = service.make_rag(lancedb(&dir)).await.unwrap();

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let service = Arc::clone(&service);
            let id = id.clone();
            tokio::spawn(async move {
                service
                    .ingest_file(&id, &Document::text(format!("shared note {}", i)))
                    .await
            })
        })
        .collect();

    for handle in handles {
        let task = handle.await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Done, "{:?}", task.detail);
        assert_eq!(task.chunks, 1);
    }

    let hits = service.retrieve_query(&id, "default", "shared").await.unwrap();
    assert_eq!(hits.len(), 40);
    let distinct: HashSet<_> = hits.iter().map(|h| h.text.as_str()).collect();
    assert_eq!(distinct.len(), 40);
}
