//! Data access layer for outbound HTTP.
//!
//! This crate provides:
//! - `HttpClient` - The transport seam (Spin in production, stubs in tests)
//! - `FetchClient` - Default headers plus optional edge caching of bodies
//! - `OutboundRequest` / `InboundResponse` - Transport-neutral messages
//! - `ResponseBody` - A streamed response body

mod client;
mod message;
#[cfg(target_arch = "wasm32")]
mod spin;

pub use client::*;
pub use message::*;
#[cfg(target_arch = "wasm32")]
pub use spin::*;
