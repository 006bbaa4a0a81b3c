//! Core abstractions for edge HTTP workloads.
//!
//! This crate provides the fundamental request types:
//! - `RequestId` - Unique request identifier for log correlation
//! - `RequestContext` - Method, path, query and headers of an inbound request
//! - `TimingContext` - Request timing marks

mod context;
mod lifecycle;

pub use context::*;
pub use lifecycle::*;

// Workloads match on methods without depending on `http` directly.
pub use http::Method;
