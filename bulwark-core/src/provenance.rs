//! Result wrapper and provenance metadata
//!
//! Every successful execution returns a [`ToolResult`]: the value plus a record of
//! where it came from, when it was fetched and whether it was served from cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance metadata attached to a tool result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Where the value came from (tool name, or `tool.<source>` for adapters)
    pub source: String,

    /// Reference identifier within the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,

    /// Locator of the underlying data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// When the value was originally fetched; on a cache hit this is the time of the
    /// execution that populated the cache, not the time of the read
    pub fetched_at: DateTime<Utc>,

    /// Whether the value was served from cache
    pub cache_hit: bool,

    /// SHA-256 of the canonical JSON form of the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_digest: Option<String>,
}

impl Provenance {
    /// Create provenance for a value fetched just now
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ref_id: None,
            source_url: None,
            fetched_at: Utc::now(),
            cache_hit: false,
            response_digest: None,
        }
    }

    /// Provenance for fixture-backed data (`fixtures://<source>/<ref_id>`)
    pub fn for_fixture(source: &str, ref_id: Option<&str>) -> Self {
        let provenance = Self::new(format!("tool.{}", source));
        match ref_id {
            Some(id) => provenance
                .with_ref_id(format!("{}/{}", source, id))
                .with_source_url(format!("fixtures://{}/{}", source, id)),
            None => provenance
                .with_ref_id(source)
                .with_source_url(format!("fixtures://{}", source)),
        }
    }

    /// Provenance for data fetched over HTTP
    pub fn for_http(source: &str, url: impl Into<String>, cache_hit: bool) -> Self {
        Self::new(format!("tool.{}", source))
            .with_ref_id(source)
            .with_source_url(url)
            .with_cache_hit(cache_hit)
    }

    /// Set reference id
    pub fn with_ref_id(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = Some(ref_id.into());
        self
    }

    /// Set source URL
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Set fetch time
    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = fetched_at;
        self
    }

    /// Set cache-hit flag
    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }

    /// Set response digest
    pub fn with_response_digest(mut self, digest: impl Into<String>) -> Self {
        self.response_digest = Some(digest.into());
        self
    }
}

/// A successful tool result with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult<T> {
    /// The value returned by the tool (or the cache)
    pub value: T,
    /// Where and when the value was obtained
    pub provenance: Provenance,
}

impl<T> ToolResult<T> {
    /// Wrap a value
    pub fn new(value: T, provenance: Provenance) -> Self {
        Self { value, provenance }
    }

    /// Whether the value came from cache
    pub fn is_cache_hit(&self) -> bool {
        self.provenance.cache_hit
    }

    /// Transform the value, keeping provenance
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ToolResult<U> {
        ToolResult {
            value: f(self.value),
            provenance: self.provenance,
        }
    }

    /// Drop provenance
    pub fn into_value(self) -> T {
        self.value
    }
}
