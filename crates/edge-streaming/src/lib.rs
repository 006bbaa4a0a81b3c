//! Streaming primitives for proxied response bodies.
//!
//! - `StreamingSink` - Forwards an upstream byte stream into the client body
//!   and stops pulling upstream as soon as the client goes away.

mod sink;

pub use sink::*;
