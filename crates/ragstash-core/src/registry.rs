//! Registry of live RAG instances keyed by identity.

use crate::config::{RagConfig, Settings};
use crate::error::{Error, Result};
use crate::models::RagId;
use crate::storage::Backend;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A live, initialized RAG: its identity, the configuration it was created
/// from, and the backend bound to it.
#[derive(Debug)]
pub struct RagEntry {
    pub id: RagId,
    pub config: RagConfig,
    pub backend: Backend,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Entries {
    live: HashMap<RagId, Arc<RagEntry>>,
    /// Identities that were removed; they are never handed out again
    retired: HashSet<RagId>,
}

impl Entries {
    fn is_taken(&self, id: &RagId) -> bool {
        self.live.contains_key(id) || self.retired.contains(id)
    }

    fn fresh_id(&self, mut mint: impl FnMut() -> RagId) -> RagId {
        let mut id = mint();
        while self.is_taken(&id) {
            id = mint();
        }
        id
    }

    fn retire(&mut self, id: &RagId) -> Option<Arc<RagEntry>> {
        let entry = self.live.remove(id)?;
        self.retired.insert(id.clone());
        Some(entry)
    }
}

/// Maps identities to backends. Cheap to share behind an `Arc`.
///
/// Entries are only ever inserted fully built, so a concurrent `resolve`
/// never sees a half-constructed backend. An identity names at most one
/// backend over the registry's lifetime, even after it is removed.
#[derive(Debug)]
pub struct Registry {
    settings: Arc<Settings>,
    entries: RwLock<Entries>,
}

impl Registry {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            entries: RwLock::new(Entries::default()),
        }
    }

    /// Validate `config`, build its backend and register it under a fresh identity.
    pub async fn create(&self, config: RagConfig) -> Result<RagId> {
        let spec = config.validate()?;
        // Built outside the lock: connecting may be slow.
        let backend = Backend::connect(&spec, &self.settings).await?;

        let mut entries = self.entries.write().await;
        let id = entries.fresh_id(RagId::mint);
        entries.live.insert(
            id.clone(),
            Arc::new(RagEntry {
                id: id.clone(),
                config,
                backend,
                created_at: Utc::now(),
            }),
        );
        drop(entries);

        log::info!(
            "Created RAG {} (provider {}, index '{}')",
            id,
            spec.provider(),
            spec.default_index()
        );
        Ok(id)
    }

    pub async fn resolve(&self, id: &RagId) -> Result<Arc<RagEntry>> {
        match self.entries.read().await.live.get(id) {
            Some(entry) => Ok(Arc::clone(entry)),
            None => {
                log::debug!("No RAG registered under {}", id);
                Err(Error::NotFound(id.to_string()))
            }
        }
    }

    /// Drop the entry for `id`. In-flight calls holding it finish normally.
    pub async fn remove(&self, id: &RagId) -> Result<Arc<RagEntry>> {
        let removed = self.entries.write().await.retire(id);
        match removed {
            Some(entry) => {
                log::info!("Removed RAG {}", id);
                Ok(entry)
            }
            None => Err(Error::NotFound(id.to_string())),
        }
    }

    pub async fn contains(&self, id: &RagId) -> bool {
        self.entries.read().await.live.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.live.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.live.is_empty()
    }

    /// Registered identities, oldest first.
    pub async fn ids(&self) -> Vec<RagId> {
        let entries = self.entries.read().await;
        let mut list: Vec<_> = entries.live.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        list.into_iter().map(|e| e.id.clone()).collect()
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        log::info!("Clearing {} registered RAG(s)", entries.live.len());
        let live = std::mem::take(&mut entries.live);
        entries.retired.extend(live.into_keys());
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RagBackend;
    use assert_matches::assert_matches;

    fn memory() -> RagConfig {
        RagConfig::new("Memory")
    }

    #[tokio::test]
    async fn test_create_and_resolve() {
        let registry = Registry::default();
        let id = registry.create(memory()).await.unwrap();

        let entry = registry.resolve(&id).await.unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.config.provider, "Memory");
        assert_eq!(entry.backend.default_index(), "default");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_create_stores_nothing() {
        let registry = Registry::default();
        assert_matches!(
            registry.create(RagConfig::new("Pinecone")).await,
            Err(Error::UnknownProvider(_))
        );
        assert_matches!(
            registry.create(RagConfig::new("LanceDB")).await,
            Err(Error::InvalidConfiguration(_))
        );
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = Registry::default();
        let id = registry.create(memory()).await.unwrap();

        registry.remove(&id).await.unwrap();
        assert!(!registry.contains(&id).await);
        assert_matches!(registry.resolve(&id).await, Err(Error::NotFound(_)));
        assert_matches!(registry.remove(&id).await, Err(Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_ids_and_clear() {
        let registry = Registry::default();
        let a = registry.create(memory()).await.unwrap();
        let b = registry.create(memory()).await.unwrap();

        let ids = registry.ids().await;
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a) && ids.contains(&b));

        registry.clear().await;
        assert!(registry.is_empty().await);
        assert_matches!(registry.resolve(&a).await, Err(Error::NotFound(_)));
    }

    #[test]
    fn test_removed_ids_are_never_reminted() {
        let mut entries = Entries::default();
        entries.retired.insert(RagId::from("retired"));

        let mut minted = ["retired", "retired", "fresh"].into_iter().map(RagId::from);
        let id = entries.fresh_id(|| minted.next().unwrap());
        assert_eq!(id, RagId::from("fresh"));
    }

    #[tokio::test]
    async fn test_remove_retires_identity() {
        let registry = Registry::default();
        let id = registry.create(memory()).await.unwrap();
        registry.remove(&id).await.unwrap();

        let entries = registry.entries.read().await;
        assert!(entries.is_taken(&id));

        let mut minted = [id.clone(), RagId::from("next")].into_iter();
        let next = entries.fresh_id(|| minted.next().unwrap());
        assert_eq!(next, RagId::from("next"));
    }
}
