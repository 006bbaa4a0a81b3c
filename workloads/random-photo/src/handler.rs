//! Request handling, independent of the Spin runtime.

use edge_sdk::edge_cache::{
    header_names, should_include_debug_headers, CacheHeadersBuilder, CacheKey, CacheStatus,
    SharedBackend,
};
use edge_sdk::edge_core::{Method, RequestContext};
use edge_sdk::edge_data::{FetchClient, HttpClient};
use edge_sdk::edge_observability::StructuredLogger;
use rand::Rng;

use crate::collection::{CollectionCache, PendingWrite, Resolution};
use crate::config::Config;
use crate::error::{ConfigError, ServeError};
use crate::response::EdgeResponse;
use crate::server::ImageServer;

/// Client identifier sent upstream.
pub const USER_AGENT: &str = concat!("random-photo-edge/", env!("CARGO_PKG_VERSION"));

/// The fetch client used for every upstream call.
///
/// `store` backs the cached-proxy image cache.
pub fn fetch_client<C: HttpClient>(transport: C, store: Option<SharedBackend>) -> FetchClient<C> {
    FetchClient::new(transport)
        .with_default_header("User-Agent", USER_AGENT)
        .with_edge_cache(store)
}

/// A response and the cache write to issue after it has been sent.
#[derive(Debug)]
pub struct Handled {
    pub response: EdgeResponse,
    pub pending_write: Option<PendingWrite>,
}

/// Everything a request needs, built by the runtime entry point.
pub struct Handler<'a, C: HttpClient> {
    config: &'a Result<Config, ConfigError>,
    client: &'a FetchClient<C>,
    store: Option<SharedBackend>,
    logger: &'a StructuredLogger,
}

impl<'a, C: HttpClient> Handler<'a, C> {
    pub fn new(
        config: &'a Result<Config, ConfigError>,
        client: &'a FetchClient<C>,
        store: Option<SharedBackend>,
        logger: &'a StructuredLogger,
    ) -> Self {
        Self {
            config,
            client,
            store,
            logger,
        }
    }

    /// Handle one request. Never fails: errors become the JSON envelope.
    pub async fn handle<R: Rng + ?Sized>(&self, ctx: &RequestContext, rng: &mut R) -> Handled {
        self.logger
            .info_builder("request started")
            .field("method", ctx.method.as_str())
            .emit();

        // Preflight does not depend on configuration.
        if ctx.method == Method::OPTIONS {
            return Handled {
                response: EdgeResponse::preflight(),
                pending_write: None,
            };
        }

        let (response, pending_write) = if ctx.method == Method::GET || ctx.method == Method::HEAD {
            match self.serve(ctx, rng).await {
                Ok(served) => served,
                Err(error) => {
                    self.log_error(&error);
                    (EdgeResponse::error(&error), None)
                }
            }
        } else {
            (EdgeResponse::error(&ServeError::MethodNotAllowed), None)
        };

        let mut response = response.header(header_names::X_REQUEST_ID, ctx.request_id.as_str());
        if ctx.method == Method::HEAD {
            response = response.without_body();
        }

        self.logger
            .info_builder("request completed")
            .field_u64("status", response.status.as_u16() as u64)
            .field_u64("elapsed_us", self.logger.elapsed_us())
            .emit();

        Handled {
            response,
            pending_write,
        }
    }

    async fn serve<R: Rng + ?Sized>(
        &self,
        ctx: &RequestContext,
        rng: &mut R,
    ) -> Result<(EdgeResponse, Option<PendingWrite>), ServeError> {
        let config = self.config.as_ref().map_err(|e| ServeError::from(e.clone()))?;

        for warning in &config.warnings {
            self.logger
                .warn_builder("configuration value ignored")
                .field("detail", warning.as_str())
                .emit();
        }

        let cache = CollectionCache::from_config(self.client, self.store.clone(), config);
        let Resolution {
            media,
            cache_status,
            key,
            pending_write,
        } = cache
            .resolve(&config.collection_id, config.per_page, config.list_ttl, self.logger)
            .await?;

        self.logger
            .info_builder("collection resolved")
            .field_display("cache", cache_status)
            .field("key", key.as_str())
            .field_u64("count", media.len() as u64)
            .emit();

        let server = ImageServer::from_config(self.client, config);
        self.logger
            .debug_builder("delivering")
            .field_display("mode", server.mode())
            .emit();

        // The list is already fetched, so a failed delivery still caches it.
        let response = match server.select_and_respond(&media, rng, self.logger).await {
            Ok(response) => response,
            Err(error) => {
                self.log_error(&error);
                EdgeResponse::error(&error)
            }
        };

        Ok((with_cache_headers(ctx, response, cache_status, &key), pending_write))
    }

    fn log_error(&self, error: &ServeError) {
        let status = error.status_code();
        let builder = if status.is_server_error() {
            self.logger.error_builder("request failed")
        } else {
            self.logger.warn_builder("request failed")
        };
        builder
            .field_u64("status", status.as_u16() as u64)
            .field_display("error", error)
            .emit();
    }
}

/// Adds `X-Cache-Status`, and `X-Cache-Key` when the client asks for it.
fn with_cache_headers(
    ctx: &RequestContext,
    response: EdgeResponse,
    status: CacheStatus,
    key: &CacheKey,
) -> EdgeResponse {
    let request_headers: Vec<(String, String)> = ctx
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let headers = CacheHeadersBuilder::new()
        .status(status)
        .key(key)
        .include_debug(should_include_debug_headers(&request_headers))
        .build();
    response.with_headers(headers)
}
