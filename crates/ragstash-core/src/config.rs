//! RAG configurations and process-level settings.
//!
//! A [`RagConfig`] is the declared intent for one backend: a provider tag plus
//! provider-specific parameters, exactly as a transport received them. It is
//! turned into a typed [`BackendSpec`] by [`RagConfig::validate`] before any
//! backend is built. [`Settings`] holds the knobs shared by every backend of a
//! process (chunking, scoring, pool sizes).

use crate::error::{Error, Result};
use crate::provider::Provider;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Index used when a configuration does not name one.
pub const DEFAULT_INDEX: &str = "default";

const MAX_INDEX_LEN: usize = 64;

fn default_index() -> String {
    DEFAULT_INDEX.to_string()
}

/// Untyped RAG configuration as received from a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    pub provider: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl RagConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            params: Map::new(),
        }
    }

    /// Add a provider parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| Error::invalid_config(format!("Malformed RAG configuration: {}", e)))
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| Error::invalid_config(format!("Malformed RAG configuration: {}", e)))
    }

    /// Check the provider tag, then the provider parameters.
    ///
    /// An unrecognized tag is reported as [`Error::UnknownProvider`] even when
    /// the parameters are also wrong.
    pub fn validate(&self) -> Result<BackendSpec> {
        let provider: Provider = self.provider.parse()?;
        let params = Value::Object(self.params.clone());

        let spec = match provider {
            Provider::LanceDb => BackendSpec::LanceDb(parse_params(provider, params)?),
            Provider::MongoDb => BackendSpec::MongoDb(parse_params(provider, params)?),
            Provider::Memory => BackendSpec::Memory(parse_params(provider, params)?),
        };
        spec.check()?;
        Ok(spec)
    }
}

fn parse_params<T: DeserializeOwned>(provider: Provider, params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| Error::invalid_config(format!("{} parameters: {}", provider, e)))
}

/// Validated, typed configuration for one backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendSpec {
    LanceDb(LanceDbParams),
    MongoDb(MongoDbParams),
    Memory(MemoryParams),
}

impl BackendSpec {
    pub fn provider(&self) -> Provider {
        match self {
            BackendSpec::LanceDb(_) => Provider::LanceDb,
            BackendSpec::MongoDb(_) => Provider::MongoDb,
            BackendSpec::Memory(_) => Provider::Memory,
        }
    }

    /// The index declared at creation time.
    pub fn default_index(&self) -> &str {
        match self {
            BackendSpec::LanceDb(p) => &p.index,
            BackendSpec::MongoDb(p) => &p.collection,
            BackendSpec::Memory(p) => &p.index,
        }
    }

    fn check(&self) -> Result<()> {
        validate_index_name(self.default_index())?;

        match self {
            BackendSpec::LanceDb(p) => {
                if p.path.as_os_str().is_empty() {
                    return Err(Error::invalid_config("LanceDB parameters: `path` is empty"));
                }
                if p.dimension == Some(0) {
                    return Err(Error::invalid_config(
                        "LanceDB parameters: `dimension` must be positive",
                    ));
                }
            }
            BackendSpec::MongoDb(p) => {
                if !(p.uri.starts_with("mongodb://") || p.uri.starts_with("mongodb+srv://")) {
                    return Err(Error::invalid_config(
                        "MongoDB parameters: `uri` must start with mongodb:// or mongodb+srv://",
                    ));
                }
                if p.database.trim().is_empty() {
                    return Err(Error::invalid_config("MongoDB parameters: `database` is empty"));
                }
                if p.username.is_some() != p.password.is_some() {
                    return Err(Error::invalid_config(
                        "MongoDB parameters: `username` and `password` must be given together",
                    ));
                }
            }
            BackendSpec::Memory(_) => {}
        }
        Ok(())
    }
}

/// Parameters of the embedded vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LanceDbParams {
    /// Directory holding the index files; created if missing.
    pub path: PathBuf,
    #[serde(default = "default_index")]
    pub index: String,
    /// Overrides [`Settings::embedding_dimension`].
    #[serde(default)]
    pub dimension: Option<usize>,
}

/// Parameters of the MongoDB document store.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MongoDbParams {
    pub uri: String,
    pub database: String,
    #[serde(default = "default_index")]
    pub collection: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for MongoDbParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDbParams")
            .field("uri", &self.uri)
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Parameters of the in-process document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryParams {
    #[serde(default = "default_index")]
    pub index: String,
}

impl Default for MemoryParams {
    fn default() -> Self {
        Self {
            index: default_index(),
        }
    }
}

/// Index names become table values and collection names, so keep them tame.
pub fn validate_index_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_INDEX_LEN {
        return Err(Error::invalid_config(format!(
            "Index name must be 1-{} characters long, got {:?}",
            MAX_INDEX_LEN, name
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::invalid_config(format!(
            "Index name {:?} may only contain letters, digits, '_' and '-'",
            name
        )));
    }
    Ok(())
}

/// Process-wide tuning shared by every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Maximum results per query.
    pub top_k: usize,
    /// Results must score strictly above this floor.
    pub min_score: f32,
    pub embedding_dimension: usize,
    /// Connections per SQLite pool.
    pub pool_size: u32,
    pub server_selection_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            chunk_overlap: 20,
            top_k: 10,
            min_score: 0.0,
            embedding_dimension: 256,
            pool_size: 4,
            server_selection_timeout_ms: 5_000,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::invalid_config("chunk_size must be positive"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::invalid_config(
                "chunk_overlap must be smaller than chunk_size",
            ));
        }
        if self.top_k == 0 {
            return Err(Error::invalid_config("top_k must be positive"));
        }
        if !self.min_score.is_finite() {
            return Err(Error::invalid_config(format!(
                "min_score must be a finite number, got {}",
                self.min_score
            )));
        }
        if self.embedding_dimension == 0 {
            return Err(Error::invalid_config("embedding_dimension must be positive"));
        }
        if self.pool_size == 0 {
            return Err(Error::invalid_config("pool_size must be positive"));
        }
        Ok(())
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| Error::invalid_config(format!("Failed to parse settings: {}", e)))
    }

    /// Apply `RAGSTASH_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(&lookup, "RAGSTASH_CHUNK_SIZE", &mut self.chunk_size)?;
        override_from(&lookup, "RAGSTASH_CHUNK_OVERLAP", &mut self.chunk_overlap)?;
        override_from(&lookup, "RAGSTASH_TOP_K", &mut self.top_k)?;
        override_from(&lookup, "RAGSTASH_MIN_SCORE", &mut self.min_score)?;
        override_from(
            &lookup,
            "RAGSTASH_EMBEDDING_DIMENSION",
            &mut self.embedding_dimension,
        )?;
        override_from(&lookup, "RAGSTASH_POOL_SIZE", &mut self.pool_size)?;
        override_from(
            &lookup,
            "RAGSTASH_SERVER_SELECTION_TIMEOUT_MS",
            &mut self.server_selection_timeout_ms,
        )?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }
}

fn override_from<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| Error::invalid_config(format!("{}={:?}: {}", key, raw, e)))?;
    }
    Ok(())
}

/// Default location of the settings file.
pub fn settings_path() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| Error::other("Could not determine config directory"))?
        .join("ragstash/settings.toml"))
}

/// Load settings from `path` (defaults if it does not exist), then apply
/// environment overrides and validate.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let mut settings = if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        Settings::from_toml(&raw)?
    } else {
        Settings::default()
    };

    settings.apply_env_overrides()?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings from the default location.
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&settings_path()?)
}
