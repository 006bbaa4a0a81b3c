//! Collection media list, cached in the key-value store.

use std::fmt;
use std::time::{Duration, Instant};

use edge_sdk::edge_cache::{collection_key, CacheKey, CacheResult, CacheStatus, SharedBackend};
use edge_sdk::edge_data::{FetchClient, FetchError, HttpClient, OutboundRequest};
use edge_sdk::edge_observability::StructuredLogger;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Deserialize;

use crate::config::Config;
use crate::error::CollectionError;
use crate::media::{MediaItem, MediaList};

/// Bytes escaped in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Collections endpoint response. Only `media` is read.
#[derive(Debug, Deserialize)]
struct CollectionPage {
    #[serde(default)]
    media: Option<Vec<MediaItem>>,
}

/// Outcome of [`CollectionCache::resolve`].
#[derive(Debug)]
pub struct Resolution {
    pub media: MediaList,
    /// HIT when served from the store, MISS when fetched, BYPASS without a store.
    pub cache_status: CacheStatus,
    pub key: CacheKey,
    /// Store write for a freshly fetched list, left for the caller to issue
    /// once the response is on its way.
    pub pending_write: Option<PendingWrite>,
}

/// A cache write that has been prepared but not yet issued.
pub struct PendingWrite {
    store: SharedBackend,
    key: CacheKey,
    value: Vec<u8>,
    ttl: Duration,
}

impl PendingWrite {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue the write.
    pub async fn commit(self) -> CacheResult<()> {
        self.store.put(self.key.as_str(), self.value, self.ttl).await
    }
}

impl fmt::Debug for PendingWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWrite")
            .field("key", &self.key.as_str())
            .field("bytes", &self.value.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Resolves a collection to its media list, store first.
///
/// A missing store means every call goes upstream. Concurrent misses are not
/// coalesced.
pub struct CollectionCache<'a, C: HttpClient> {
    client: &'a FetchClient<C>,
    store: Option<SharedBackend>,
    api_base: &'a str,
    api_key: &'a str,
}

impl<'a, C: HttpClient> CollectionCache<'a, C> {
    pub fn new(
        client: &'a FetchClient<C>,
        store: Option<SharedBackend>,
        api_base: &'a str,
        api_key: &'a str,
    ) -> Self {
        Self {
            client,
            store,
            api_base,
            api_key,
        }
    }

    pub fn from_config(client: &'a FetchClient<C>, store: Option<SharedBackend>, config: &'a Config) -> Self {
        Self::new(client, store, &config.api_base, &config.api_key)
    }

    /// Upstream URL for one page of a collection. The id is encoded as a
    /// single path segment.
    pub fn collection_url(&self, collection_id: &str, per_page: u32) -> String {
        format!(
            "{}/v1/collections/{}?per_page={}",
            self.api_base.trim_end_matches('/'),
            utf8_percent_encode(collection_id, PATH_SEGMENT),
            per_page
        )
    }

    /// Resolve `collection_id` to a non-empty media list.
    ///
    /// Store errors and undecodable entries are a miss. An empty upstream
    /// list is [`CollectionError::Empty`] and is never cached.
    pub async fn resolve(
        &self,
        collection_id: &str,
        per_page: u32,
        ttl: Duration,
        logger: &StructuredLogger,
    ) -> Result<Resolution, CollectionError> {
        if self.api_key.is_empty() {
            return Err(CollectionError::MissingApiKey);
        }

        let key = collection_key(collection_id, per_page);

        if let Some(store) = &self.store {
            match read_cached(store, &key).await {
                Ok(Some(media)) => {
                    logger
                        .debug_builder("collection cache hit")
                        .field("key", key.as_str())
                        .field_u64("count", media.len() as u64)
                        .emit();
                    return Ok(Resolution {
                        media,
                        cache_status: CacheStatus::Hit,
                        key,
                        pending_write: None,
                    });
                }
                Ok(None) => {
                    logger
                        .debug_builder("collection cache miss")
                        .field("key", key.as_str())
                        .emit();
                }
                Err(e) => {
                    logger
                        .warn_builder("collection cache read failed")
                        .field("key", key.as_str())
                        .field_display("error", &e)
                        .emit();
                }
            }
        }

        let media = self.fetch(collection_id, per_page, logger).await?;

        let (cache_status, pending_write) = match &self.store {
            None => (CacheStatus::Bypass, None),
            Some(store) => match serde_json::to_vec(&media) {
                Ok(value) => (
                    CacheStatus::Miss,
                    Some(PendingWrite {
                        store: store.clone(),
                        key: key.clone(),
                        value,
                        ttl,
                    }),
                ),
                Err(e) => {
                    logger
                        .warn_builder("collection not cacheable")
                        .field_display("error", &e)
                        .emit();
                    (CacheStatus::Miss, None)
                }
            },
        };

        Ok(Resolution {
            media,
            cache_status,
            key,
            pending_write,
        })
    }

    async fn fetch(
        &self,
        collection_id: &str,
        per_page: u32,
        logger: &StructuredLogger,
    ) -> Result<MediaList, CollectionError> {
        let url = self.collection_url(collection_id, per_page);
        let started = Instant::now();

        let request = OutboundRequest::get(url.as_str())
            .header("Authorization", self.api_key)
            .header("Accept", "application/json");
        let response = self.client.send(request).await?;

        if !response.is_success() {
            logger
                .warn_builder("collection fetch rejected")
                .field("url", url.as_str())
                .field_u64("status", response.status as u64)
                .emit();
            return Err(CollectionError::Upstream {
                status: response.status,
            });
        }

        let status = response.status;
        let page: CollectionPage = response.json().await.map_err(|e| match e {
            FetchError::Deserialization(message) => CollectionError::Malformed(message),
            other => CollectionError::Fetch(other),
        })?;
        let items = page.media.unwrap_or_default();

        logger
            .info_builder("collection fetched")
            .field("collection_id", collection_id)
            .field_u64("status", status as u64)
            .field_u64("count", items.len() as u64)
            .duration_ms("duration_ms", started.elapsed())
            .emit();

        MediaList::new(items).ok_or(CollectionError::Empty)
    }
}

async fn read_cached(store: &SharedBackend, key: &CacheKey) -> CacheResult<Option<MediaList>> {
    let Some(bytes) = store.get(key.as_str()).await? else {
        return Ok(None);
    };
    Ok(serde_json::from_slice::<Vec<MediaItem>>(&bytes)
        .ok()
        .and_then(MediaList::new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use edge_sdk::edge_cache::{InMemoryBackend, KvBackend, ManualClock};
    use futures::executor::block_on;

    use crate::handler::{fetch_client, USER_AGENT};
    use crate::test_support::*;

    const TTL: Duration = Duration::from_secs(900);

    fn items() -> Vec<MediaItem> {
        vec![photo(1, &["original"]), photo(2, &["large"])]
    }

    fn resolve<C: HttpClient>(
        client: &FetchClient<C>,
        store: Option<SharedBackend>,
    ) -> Result<Resolution, CollectionError> {
        let (logger, _) = logger();
        let cache = CollectionCache::new(client, store, API_BASE, "test-key");
        block_on(cache.resolve(COLLECTION_ID, 80, TTL, &logger))
    }

    fn commit(resolution: &mut Resolution) {
        if let Some(write) = resolution.pending_write.take() {
            block_on(write.commit()).unwrap();
        }
    }

    // === Cache behaviour ===

    #[test]
    fn test_miss_fetches_and_prepares_write() {
        let store = Rc::new(InMemoryBackend::new());
        let transport = StubTransport::new().respond(API_BASE, 200, &[], &collection_body(&items()));
        let client = fetch_client(transport, None);

        let mut first = resolve(&client, Some(store.clone() as SharedBackend)).unwrap();
        assert_eq!(first.cache_status, CacheStatus::Miss);
        assert_eq!(first.media.len(), 2);
        assert_eq!(first.key.as_str(), "collection:abc123:per_page=80");
        // Nothing is written until the caller commits.
        assert_eq!(store.put_count(), 0);

        commit(&mut first);
        let entry = store.entry("collection:abc123:per_page=80").unwrap();
        assert_eq!(entry.ttl_secs, 900);
        assert_eq!(client.transport().calls_to(API_BASE), 1);
    }

    #[test]
    fn test_hit_within_ttl_skips_upstream() {
        let store = Rc::new(InMemoryBackend::new());
        let transport = StubTransport::new().respond(API_BASE, 200, &[], &collection_body(&items()));
        let client = fetch_client(transport, None);

        let mut first = resolve(&client, Some(store.clone() as SharedBackend)).unwrap();
        commit(&mut first);

        let second = resolve(&client, Some(store.clone() as SharedBackend)).unwrap();
        assert_eq!(second.cache_status, CacheStatus::Hit);
        assert!(second.pending_write.is_none());
        assert_eq!(second.media, first.media);
        assert_eq!(client.transport().calls_to(API_BASE), 1);
    }

    #[test]
    fn test_expiry_refetches_once() {
        let clock = Rc::new(ManualClock::new(1_000));
        let store = Rc::new(InMemoryBackend::with_clock(clock.clone()));
        let transport = StubTransport::new().respond(API_BASE, 200, &[], &collection_body(&items()));
        let client = fetch_client(transport, None);

        let mut first = resolve(&client, Some(store.clone() as SharedBackend)).unwrap();
        commit(&mut first);

        clock.advance(Duration::from_secs(899));
        let hit = resolve(&client, Some(store.clone() as SharedBackend)).unwrap();
        assert_eq!(hit.cache_status, CacheStatus::Hit);

        clock.advance(Duration::from_secs(1));
        let mut refreshed = resolve(&client, Some(store.clone() as SharedBackend)).unwrap();
        assert_eq!(refreshed.cache_status, CacheStatus::Miss);
        commit(&mut refreshed);

        assert_eq!(client.transport().calls_to(API_BASE), 2);
        assert_eq!(store.put_count(), 2);
        assert_eq!(store.keys(), vec!["collection:abc123:per_page=80".to_string()]);
    }

    #[test]
    fn test_corrupt_or_empty_entry_is_a_miss() {
        let store = Rc::new(InMemoryBackend::new());
        let key = collection_key(COLLECTION_ID, 80);
        let transport = StubTransport::new().respond(API_BASE, 200, &[], &collection_body(&items()));
        let client = fetch_client(transport, None);

        block_on(store.put(key.as_str(), b"not json".to_vec(), TTL)).unwrap();
        let first = resolve(&client, Some(store.clone() as SharedBackend)).unwrap();
        assert_eq!(first.cache_status, CacheStatus::Miss);

        block_on(store.put(key.as_str(), b"[]".to_vec(), TTL)).unwrap();
        let second = resolve(&client, Some(store.clone() as SharedBackend)).unwrap();
        assert_eq!(second.cache_status, CacheStatus::Miss);

        assert_eq!(client.transport().calls_to(API_BASE), 2);
    }

    #[test]
    fn test_without_store_always_fetches() {
        let transport = StubTransport::new().respond(API_BASE, 200, &[], &collection_body(&items()));
        let client = fetch_client(transport, None);

        let first = resolve(&client, None).unwrap();
        let second = resolve(&client, None).unwrap();

        assert_eq!(first.cache_status, CacheStatus::Bypass);
        assert!(first.pending_write.is_none());
        assert_eq!(second.cache_status, CacheStatus::Bypass);
        assert_eq!(client.transport().calls_to(API_BASE), 2);
    }

    // === Upstream request ===

    #[test]
    fn test_upstream_request_shape() {
        let transport = StubTransport::new().respond(API_BASE, 200, &[], &collection_body(&items()));
        let client = fetch_client(transport, None);

        resolve(&client, None).unwrap();

        let requests = client.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, collection_url(80));
        assert_eq!(requests[0].header_value("authorization"), Some("test-key"));
        assert_eq!(requests[0].header_value("user-agent"), Some(USER_AGENT));
    }

    #[test]
    fn test_collection_id_is_one_path_segment() {
        let client = fetch_client(StubTransport::new(), None);
        let cache = CollectionCache::new(&client, None, "https://api.test/", "k");

        assert_eq!(
            cache.collection_url("abc123", 80),
            "https://api.test/v1/collections/abc123?per_page=80"
        );
        assert_eq!(
            cache.collection_url("a/b?c#d e%", 10),
            "https://api.test/v1/collections/a%2Fb%3Fc%23d%20e%25?per_page=10"
        );
    }

    #[test]
    fn test_missing_api_key_makes_no_request() {
        let client = fetch_client(StubTransport::new(), None);
        let (logger, _) = logger();
        let cache = CollectionCache::new(&client, None, API_BASE, "");

        let result = block_on(cache.resolve(COLLECTION_ID, 80, TTL, &logger));
        assert!(matches!(result, Err(CollectionError::MissingApiKey)));
        assert_eq!(client.transport().requests().len(), 0);
    }

    // === Failures ===

    #[test]
    fn test_empty_media_is_not_cached() {
        let store = Rc::new(InMemoryBackend::new());
        for body in [
            br#"{"media": []}"#.to_vec(),
            br#"{"media": null}"#.to_vec(),
            br#"{"page": 1}"#.to_vec(),
        ] {
            let transport = StubTransport::new().respond(API_BASE, 200, &[], &body);
            let client = fetch_client(transport, None);
            let result = resolve(&client, Some(store.clone() as SharedBackend));
            assert!(matches!(result, Err(CollectionError::Empty)));
        }
        assert_eq!(store.put_count(), 0);
    }

    #[test]
    fn test_upstream_status_is_surfaced() {
        let store = Rc::new(InMemoryBackend::new());
        let transport = StubTransport::new().respond(API_BASE, 401, &[], br#"{"error":"nope"}"#);
        let client = fetch_client(transport, None);

        let result = resolve(&client, Some(store.clone() as SharedBackend));
        assert!(matches!(result, Err(CollectionError::Upstream { status: 401 })));
        assert_eq!(store.put_count(), 0);
    }

    #[test]
    fn test_malformed_payload() {
        let transport = StubTransport::new().respond(API_BASE, 200, &[], br#"{"media": "lots"}"#);
        let client = fetch_client(transport, None);
        assert!(matches!(resolve(&client, None), Err(CollectionError::Malformed(_))));

        let transport = StubTransport::new().respond(API_BASE, 200, &[], b"<html>");
        let client = fetch_client(transport, None);
        assert!(matches!(resolve(&client, None), Err(CollectionError::Malformed(_))));
    }

    #[test]
    fn test_transport_failure() {
        let client = fetch_client(StubTransport::new().fail(API_BASE, "connection refused"), None);
        assert!(matches!(resolve(&client, None), Err(CollectionError::Fetch(_))));
    }
}
