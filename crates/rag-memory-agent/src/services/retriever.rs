use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Optional metadata filters forwarded verbatim to the retriever backend.
pub type SearchFilters = BTreeMap<String, serde_json::Value>;

pub const UNKNOWN_SOURCE: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedMetadata {
    pub title: Option<String>,
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One ranked search hit. Lower `distance` means closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub metadata: RetrievedMetadata,
    pub distance: f32,
}

impl RetrievedChunk {
    /// Source title, falling back to `"Unknown"`.
    pub fn title(&self) -> &str {
        self.metadata.title.as_deref().unwrap_or(UNKNOWN_SOURCE)
    }
}

/// Similarity search over an external chunk index.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `top_k` chunks in rank order.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<SearchFilters>,
    ) -> Result<Vec<RetrievedChunk>>;
}

/// Retriever that always returns the same ranked chunks, truncated to `top_k`.
#[derive(Debug, Clone, Default)]
pub struct StaticRetriever {
    chunks: Vec<RetrievedChunk>,
}

impl StaticRetriever {
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self { chunks }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(
        &self,
        _query: &str,
        top_k: usize,
        _filters: Option<SearchFilters>,
    ) -> Result<Vec<RetrievedChunk>> {
        Ok(self.chunks.iter().take(top_k).cloned().collect())
    }
}
