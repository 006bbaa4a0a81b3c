//! Cache key composition.

use serde::{Deserialize, Serialize};

/// A cache key uniquely identifying a cached value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// The computed key string.
    key: String,
    /// Components that make up the key (for debugging).
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    components: Vec<String>,
}

impl CacheKey {
    /// Create a cache key from a string.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            components: Vec::new(),
        }
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Get the key components (for debugging).
    pub fn components(&self) -> &[String] {
        &self.components
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Component of a cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyComponent {
    /// Bare segment, rendered as-is.
    Segment(String),
    /// Named parameter, rendered as `name=value`.
    Param(String, String),
}

impl KeyComponent {
    fn render(&self) -> String {
        match self {
            Self::Segment(s) => s.clone(),
            Self::Param(name, value) => format!("{}={}", name, value),
        }
    }
}

/// Builder for composing `:`-separated cache keys.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyBuilder {
    prefix: Option<String>,
    components: Vec<KeyComponent>,
}

impl CacheKeyBuilder {
    /// Create a new cache key builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a prefix for the cache key.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Append a bare segment.
    pub fn segment(mut self, value: impl ToString) -> Self {
        self.components.push(KeyComponent::Segment(value.to_string()));
        self
    }

    /// Append a `name=value` parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.components
            .push(KeyComponent::Param(name.into(), value.to_string()));
        self
    }

    /// Build the cache key.
    pub fn build(&self) -> CacheKey {
        let components: Vec<String> = self.components.iter().map(KeyComponent::render).collect();

        let mut parts = Vec::with_capacity(components.len() + 1);
        if let Some(prefix) = &self.prefix {
            parts.push(prefix.clone());
        }
        parts.extend(components.iter().cloned());

        CacheKey {
            key: parts.join(":"),
            components,
        }
    }
}

/// Key for a collection's media list: `collection:{id}:per_page={n}`.
pub fn collection_key(collection_id: &str, per_page: u32) -> CacheKey {
    CacheKeyBuilder::new()
        .with_prefix("collection")
        .segment(collection_id)
        .param("per_page", per_page)
        .build()
}

/// Key for an edge-cached outbound response body.
pub fn edge_fetch_key(url: &str) -> CacheKey {
    CacheKeyBuilder::new()
        .with_prefix("edge-fetch")
        .segment(url)
        .build()
}
