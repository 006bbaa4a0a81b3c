//! Platform fetch client with edge response caching.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use edge_cache::{edge_fetch_key, CacheStatus, SharedBackend};
use http::Method;
use serde::{Deserialize, Serialize};

use crate::message::{InboundResponse, OutboundRequest, ResponseBody};

/// Largest body kept in the edge cache, by declared `Content-Length`.
pub const DEFAULT_MAX_EDGE_CACHE_BYTES: u64 = 4 * 1024 * 1024;

/// Error type for fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request error: {0}")]
    Request(String),

    #[error("Body error: {0}")]
    Body(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Outbound HTTP transport.
#[async_trait(?Send)]
pub trait HttpClient {
    /// Send a request and return the response head with a streamed body.
    async fn send(&self, request: OutboundRequest) -> Result<InboundResponse, FetchError>;
}

/// A response body as stored in the edge cache.
#[derive(Debug, Serialize, Deserialize)]
struct CachedBody {
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    /// Base64 of the raw body.
    body: String,
}

/// Platform-controlled fetch client.
///
/// Adds default headers to every request. Requests carrying an
/// `edge_cache_ttl` are served from, and written to, the edge cache when one
/// is attached.
pub struct FetchClient<C: HttpClient> {
    inner: C,
    default_headers: Vec<(String, String)>,
    edge_cache: Option<SharedBackend>,
    max_edge_cache_bytes: u64,
}

impl<C: HttpClient> FetchClient<C> {
    /// Create a new fetch client.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            default_headers: Vec::new(),
            edge_cache: None,
            max_edge_cache_bytes: DEFAULT_MAX_EDGE_CACHE_BYTES,
        }
    }

    /// Add a header sent with every request unless the request sets it.
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Attach a store for edge-cached responses.
    pub fn with_edge_cache(mut self, store: Option<SharedBackend>) -> Self {
        self.edge_cache = store;
        self
    }

    /// Override the edge cache size limit.
    pub fn with_max_edge_cache_bytes(mut self, bytes: u64) -> Self {
        self.max_edge_cache_bytes = bytes;
        self
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &C {
        &self.inner
    }

    /// Send a request.
    pub async fn send(&self, mut request: OutboundRequest) -> Result<InboundResponse, FetchError> {
        for (name, value) in &self.default_headers {
            if request.header_value(name).is_none() {
                request.headers.push((name.clone(), value.clone()));
            }
        }

        match (request.edge_cache_ttl, &self.edge_cache) {
            (Some(ttl), Some(store)) if request.method == Method::GET => {
                self.send_cached(request, ttl, store).await
            }
            _ => self.inner.send(request).await,
        }
    }

    async fn send_cached(
        &self,
        request: OutboundRequest,
        ttl: Duration,
        store: &SharedBackend,
    ) -> Result<InboundResponse, FetchError> {
        let key = edge_fetch_key(&request.url);

        // Unreadable or undecodable entries are treated as a miss.
        if let Ok(Some(bytes)) = store.get(key.as_str()).await {
            if let Some(response) = decode_cached(&bytes) {
                return Ok(response);
            }
        }

        let response = self.inner.send(request).await?;

        let cacheable = response.is_success()
            && response
                .content_length()
                .is_some_and(|len| len <= self.max_edge_cache_bytes);
        if !cacheable {
            return Ok(response);
        }

        let InboundResponse {
            status,
            headers,
            body,
            ..
        } = response;
        let bytes = body.collect().await?;

        let cached = CachedBody {
            status,
            content_type: headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
                .map(|(_, v)| v.clone()),
            body: STANDARD.encode(&bytes),
        };
        let mut cache_status = CacheStatus::Miss;
        match serde_json::to_vec(&cached) {
            Ok(encoded) => {
                if store.put(key.as_str(), encoded, ttl).await.is_err() {
                    cache_status = CacheStatus::Bypass;
                }
            }
            Err(_) => cache_status = CacheStatus::Bypass,
        }

        let mut response = InboundResponse::new(status, headers, ResponseBody::from_bytes(bytes));
        response.cache_status = cache_status;
        Ok(response)
    }
}

fn decode_cached(bytes: &[u8]) -> Option<InboundResponse> {
    let cached: CachedBody = serde_json::from_slice(bytes).ok()?;
    let body = STANDARD.decode(cached.body.as_bytes()).ok()?;

    let mut headers = vec![("content-length".to_string(), body.len().to_string())];
    if let Some(content_type) = cached.content_type {
        headers.push(("content-type".to_string(), content_type));
    }

    let mut response = InboundResponse::new(cached.status, headers, ResponseBody::from_bytes(body));
    response.cache_status = CacheStatus::Hit;
    Some(response)
}
