//! Random photo workload.
//!
//! Serves one random image from a Pexels collection. The collection's media
//! list is cached in the Spin key-value store; the image is delivered as a
//! redirect, a streamed proxy, a cacheable proxy, or the pool itself as JSON,
//! depending on `DELIVERY_MODE`.

pub mod collection;
pub mod config;
pub mod error;
pub mod handler;
pub mod media;
pub mod response;
pub mod server;

#[cfg(target_arch = "wasm32")]
mod component;

#[cfg(test)]
mod test_support;

pub use collection::{CollectionCache, PendingWrite, Resolution};
pub use config::{Config, DeliveryMode, LogSettings, VariableSource};
pub use error::{CollectionError, ConfigError, ServeError};
pub use handler::{fetch_client, Handled, Handler};
pub use media::{MediaItem, MediaList, PoolPolicy};
pub use response::{Body, EdgeResponse};
pub use server::ImageServer;

/// Workload name used in logs.
pub const WORKLOAD: &str = "random-photo";
