//! Caching infrastructure for edge HTTP workloads.
//!
//! This crate provides:
//! - `KvBackend` - Async key-value store with per-entry TTL
//! - `InMemoryBackend` / `SpinKvBackend` - Local and Spin-hosted backends
//! - `CacheKeyBuilder` - Deterministic cache key composition
//! - `RouteCachePolicy` - `Cache-Control` rendering for responses
//! - `CacheHeadersBuilder` - Cache and debug response headers
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use edge_cache::{collection_key, InMemoryBackend, KvBackend, RouteCachePolicy};
//!
//! let store = InMemoryBackend::new();
//! let key = collection_key("abc123", 80);
//! store.put(key.as_str(), b"[]".to_vec(), Duration::from_secs(900)).await?;
//!
//! let policy = RouteCachePolicy::public(Duration::from_secs(3600));
//! assert_eq!(policy.cache_control_header(), "public, max-age=3600");
//! ```

mod headers;
mod key;
mod policy;
mod store;

pub use headers::*;
pub use key::*;
pub use policy::*;
pub use store::*;
