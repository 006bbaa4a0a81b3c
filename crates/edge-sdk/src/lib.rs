//! Public SDK for edge HTTP workloads.
//!
//! This crate re-exports all platform functionality:
//!
//! ```ignore
//! use edge_sdk::prelude::*;
//!
//! async fn handle(ctx: RequestContext, client: FetchClient<SpinHttpClient>) -> anyhow::Result<()> {
//!     let logger = StructuredLogger::new(ctx.request_id.clone());
//!     logger.info("Handling request");
//!
//!     let response = client
//!         .send(OutboundRequest::get(url).with_edge_cache(Duration::from_secs(60)))
//!         .await?;
//!
//!     let mut sink = StreamingSink::new(body, ctx.timing.clone());
//!     sink.forward(response.body).await?;
//!     Ok(())
//! }
//! ```

pub use edge_cache;
pub use edge_core;
pub use edge_data;
pub use edge_observability;
pub use edge_streaming;

/// Prelude for convenient imports.
pub mod prelude {
    pub use edge_cache::*;
    pub use edge_core::*;
    pub use edge_data::*;
    pub use edge_observability::*;
    pub use edge_streaming::*;
}
