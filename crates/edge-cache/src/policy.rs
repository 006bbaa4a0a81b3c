//! Response cache policies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cache scope determining who can cache the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    /// Cacheable by CDN and browser (shared cache).
    Public,
    /// No caching.
    #[default]
    None,
}

impl CacheScope {
    /// Get the Cache-Control directive for this scope.
    pub fn cache_control_directive(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::None => "no-store",
        }
    }
}

/// Route-level cache policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteCachePolicy {
    /// Cache scope.
    pub scope: CacheScope,
    /// Time-to-live for cached responses (`max-age`).
    pub ttl: Duration,
    /// Lifetime in shared caches only (`s-maxage`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_ttl: Option<Duration>,
    /// Force clients to revalidate on every use.
    pub must_revalidate: bool,
}

impl Default for RouteCachePolicy {
    fn default() -> Self {
        Self {
            scope: CacheScope::None,
            ttl: Duration::ZERO,
            shared_ttl: None,
            must_revalidate: false,
        }
    }
}

impl RouteCachePolicy {
    /// `no-store`.
    pub fn none() -> Self {
        Self::default()
    }

    /// `no-cache, no-store, must-revalidate`: nothing may reuse the response.
    pub fn revalidate() -> Self {
        Self {
            must_revalidate: true,
            ..Self::default()
        }
    }

    /// Create a public cache policy.
    pub fn public(ttl: Duration) -> Self {
        Self {
            scope: CacheScope::Public,
            ttl,
            ..Default::default()
        }
    }

    /// Cacheable by shared caches for `ttl`, while browsers refetch every time.
    pub fn shared_only(ttl: Duration) -> Self {
        Self {
            scope: CacheScope::Public,
            ttl: Duration::ZERO,
            shared_ttl: Some(ttl),
            ..Default::default()
        }
    }

    /// Generate Cache-Control header value.
    pub fn cache_control_header(&self) -> String {
        if self.scope == CacheScope::None {
            return if self.must_revalidate {
                "no-cache, no-store, must-revalidate".to_string()
            } else {
                "no-store".to_string()
            };
        }

        let mut parts = vec![
            self.scope.cache_control_directive().to_string(),
            format!("max-age={}", self.ttl.as_secs()),
        ];

        if let Some(shared) = self.shared_ttl {
            parts.push(format!("s-maxage={}", shared.as_secs()));
        }

        if self.must_revalidate {
            parts.push("must-revalidate".to_string());
        }

        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_no_store() {
        assert_eq!(RouteCachePolicy::none().cache_control_header(), "no-store");
    }

    #[test]
    fn test_revalidate() {
        assert_eq!(
            RouteCachePolicy::revalidate().cache_control_header(),
            "no-cache, no-store, must-revalidate"
        );
    }

    #[test]
    fn test_public() {
        let policy = RouteCachePolicy::public(Duration::from_secs(3600));
        assert_eq!(policy.cache_control_header(), "public, max-age=3600");
    }

    #[test]
    fn test_shared_only_keeps_browsers_out() {
        let policy = RouteCachePolicy::shared_only(Duration::from_secs(3600));
        assert_eq!(
            policy.cache_control_header(),
            "public, max-age=0, s-maxage=3600"
        );
    }
}
