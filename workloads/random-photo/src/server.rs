//! Image selection and delivery.

use std::time::Duration;

use edge_sdk::edge_cache::RouteCachePolicy;
use edge_sdk::edge_data::{FetchClient, HttpClient, OutboundRequest};
use edge_sdk::edge_observability::StructuredLogger;
use http::StatusCode;
use rand::Rng;
use serde::Serialize;

use crate::config::{Config, DeliveryMode, DEFAULT_IMAGE_CACHE_SECS, DEFAULT_LIST_TTL_SECS};
use crate::error::ServeError;
use crate::media::{select, MediaItem, MediaList, PoolPolicy, SourcePreference};
use crate::response::{Body, EdgeResponse};

/// Content type assumed when the image host sends none.
pub const DEFAULT_IMAGE_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Serialize)]
struct ListBody<'a> {
    media: Vec<&'a MediaItem>,
}

/// Turns a media list into a response according to the delivery mode.
pub struct ImageServer<'a, C: HttpClient> {
    client: &'a FetchClient<C>,
    mode: DeliveryMode,
    pool: PoolPolicy,
    source: SourcePreference,
    cache_duration: Duration,
    list_ttl: Duration,
}

impl<'a, C: HttpClient> ImageServer<'a, C> {
    pub fn new(client: &'a FetchClient<C>, mode: DeliveryMode) -> Self {
        Self {
            client,
            mode,
            pool: PoolPolicy::default(),
            source: SourcePreference::default(),
            cache_duration: Duration::from_secs(DEFAULT_IMAGE_CACHE_SECS),
            list_ttl: Duration::from_secs(DEFAULT_LIST_TTL_SECS),
        }
    }

    pub fn from_config(client: &'a FetchClient<C>, config: &Config) -> Self {
        Self::new(client, config.delivery_mode)
            .with_pool(config.media_pool)
            .with_source(config.source.clone())
            .with_cache_duration(config.image_cache)
            .with_list_ttl(config.list_ttl)
    }

    pub fn with_pool(mut self, pool: PoolPolicy) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_source(mut self, source: SourcePreference) -> Self {
        self.source = source;
        self
    }

    /// Shared-cache lifetime of a cached-proxy response.
    pub fn with_cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = duration;
        self
    }

    /// Shared-cache lifetime of a list response.
    pub fn with_list_ttl(mut self, ttl: Duration) -> Self {
        self.list_ttl = ttl;
        self
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Pick an item from `media` and build the response for it.
    pub async fn select_and_respond<R: Rng + ?Sized>(
        &self,
        media: &MediaList,
        rng: &mut R,
        logger: &StructuredLogger,
    ) -> Result<EdgeResponse, ServeError> {
        let pool = self.pool.pool(media);
        if pool.is_empty() {
            return Err(ServeError::NoPhotos);
        }

        match self.mode {
            DeliveryMode::List => self.list(pool),
            DeliveryMode::Redirect => {
                let url = self.pick(&pool, rng, logger)?;
                Ok(redirect(&url))
            }
            DeliveryMode::Proxy => {
                let url = self.pick(&pool, rng, logger)?;
                self.proxy(&url, RouteCachePolicy::none(), None, logger).await
            }
            DeliveryMode::CachedProxy => {
                let url = self.pick(&pool, rng, logger)?;
                // Browsers refetch so each visit can draw a new image.
                self.proxy(
                    &url,
                    RouteCachePolicy::shared_only(self.cache_duration),
                    Some(self.cache_duration),
                    logger,
                )
                .await
            }
        }
    }

    /// Select an item and resolve its image URL.
    fn pick<R: Rng + ?Sized>(
        &self,
        pool: &[&MediaItem],
        rng: &mut R,
        logger: &StructuredLogger,
    ) -> Result<String, ServeError> {
        let item = select(pool, rng).ok_or(ServeError::NoPhotos)?;
        let url = self
            .source
            .resolve(item)
            .ok_or_else(|| ServeError::NoImage {
                id: item.id.to_string(),
            })?
            .into_owned();

        logger
            .debug_builder("media selected")
            .field_display("media_id", &item.id)
            .field("url", url.as_str())
            .field_u64("pool_size", pool.len() as u64)
            .emit();

        Ok(url)
    }

    fn list(&self, pool: Vec<&MediaItem>) -> Result<EdgeResponse, ServeError> {
        let response = EdgeResponse::json(StatusCode::OK, &ListBody { media: pool })?;
        Ok(response.header(
            "Cache-Control",
            RouteCachePolicy::public(self.list_ttl).cache_control_header(),
        ))
    }

    async fn proxy(
        &self,
        url: &str,
        policy: RouteCachePolicy,
        edge_ttl: Option<Duration>,
        logger: &StructuredLogger,
    ) -> Result<EdgeResponse, ServeError> {
        let mut request = OutboundRequest::get(url).header("Accept", "image/*");
        if let Some(ttl) = edge_ttl {
            request = request.with_edge_cache(ttl);
        }

        let upstream = self
            .client
            .send(request)
            .await
            .map_err(|e| ServeError::UpstreamImage {
                url: url.to_string(),
                status: None,
                reason: Some(e.to_string()),
            })?;

        if !upstream.is_success() {
            return Err(ServeError::UpstreamImage {
                url: url.to_string(),
                status: Some(upstream.status),
                reason: None,
            });
        }

        logger
            .debug_builder("image fetched")
            .field_u64("status", upstream.status as u64)
            .field_display("edge_cache", upstream.cache_status)
            .emit();

        let status =
            StatusCode::from_u16(upstream.status).map_err(|e| ServeError::Internal(e.to_string()))?;
        let content_type = upstream
            .content_type()
            .unwrap_or(DEFAULT_IMAGE_CONTENT_TYPE)
            .to_string();
        let content_length = upstream.content_length();

        // `inline` keeps embedding pages from offering the image as a download.
        let mut response = EdgeResponse::new(status)
            .header("Content-Type", content_type)
            .header("Content-Disposition", "inline")
            .header("Cache-Control", policy.cache_control_header());
        if let Some(len) = content_length {
            response = response.header("Content-Length", len.to_string());
        }

        Ok(response.with_body(Body::Stream(upstream.body)))
    }
}

fn redirect(url: &str) -> EdgeResponse {
    EdgeResponse::new(StatusCode::FOUND)
        .header("Location", url)
        .header("Cache-Control", RouteCachePolicy::revalidate().cache_control_header())
}
