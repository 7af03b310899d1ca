//! Known backend providers.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of backend technologies a RAG can be built on.
///
/// Tags are matched case-sensitively against the `provider` field of a
/// [`RagConfig`](crate::config::RagConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    /// Embedded on-disk vector index rooted at a local path.
    #[serde(rename = "LanceDB")]
    LanceDb,
    /// MongoDB document store with a text index.
    #[serde(rename = "MongoDB")]
    MongoDb,
    /// In-process document store, for tests and development.
    #[serde(rename = "Memory")]
    Memory,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::LanceDb, Provider::MongoDb, Provider::Memory];

    /// Wire tag of this provider.
    pub fn tag(self) -> &'static str {
        match self {
            Provider::LanceDb => "LanceDB",
            Provider::MongoDb => "MongoDB",
            Provider::Memory => "Memory",
        }
    }

    /// Storage family: `"vector"` or `"document"`.
    pub fn kind(self) -> &'static str {
        match self {
            Provider::LanceDb => "vector",
            Provider::MongoDb | Provider::Memory => "document",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.tag() == s)
            .ok_or_else(|| Error::UnknownProvider(s.to_string()))
    }
}
