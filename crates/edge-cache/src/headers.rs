//! Cache response headers.

use serde::{Deserialize, Serialize};

use crate::key::CacheKey;

/// Header names for cache debugging.
pub mod header_names {
    /// Cache status header (HIT, MISS, BYPASS).
    pub const X_CACHE_STATUS: &str = "X-Cache-Status";
    /// Cache key used for lookup.
    pub const X_CACHE_KEY: &str = "X-Cache-Key";
    /// Request ID for tracing.
    pub const X_REQUEST_ID: &str = "X-Request-ID";
}

/// Status of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Fresh cache hit.
    Hit,
    /// Cache miss.
    Miss,
    /// Bypass - no cache layer available.
    Bypass,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss => write!(f, "MISS"),
            Self::Bypass => write!(f, "BYPASS"),
        }
    }
}

/// Builder for cache response headers.
#[derive(Debug, Default)]
pub struct CacheHeadersBuilder {
    status: Option<CacheStatus>,
    key: Option<String>,
    include_debug: bool,
}

impl CacheHeadersBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache lookup status.
    pub fn status(mut self, status: CacheStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the cache key used for the lookup.
    pub fn key(mut self, key: &CacheKey) -> Self {
        self.key = Some(key.as_str().to_string());
        self
    }

    /// Include the cache key in the output. The status is always emitted.
    pub fn include_debug(mut self, enabled: bool) -> Self {
        self.include_debug = enabled;
        self
    }

    /// Build the headers.
    pub fn build(self) -> Vec<(String, String)> {
        let mut headers = Vec::new();

        if let Some(status) = self.status {
            headers.push((header_names::X_CACHE_STATUS.to_string(), status.to_string()));
        }

        if self.include_debug {
            if let Some(key) = self.key {
                headers.push((header_names::X_CACHE_KEY.to_string(), key));
            }
        }

        headers
    }
}

/// Utility to check if debug headers should be included.
pub fn should_include_debug_headers(request_headers: &[(String, String)]) -> bool {
    request_headers.iter().any(|(name, value)| {
        name.eq_ignore_ascii_case("X-Debug-Cache") && value == "1"
    })
}
