//! Proxying of `/httpbin` requests to an upstream server
//!
//! The upstream body is relayed to the client chunk by chunk, followed by
//! trailers carrying its SHA-256 digest and length.

pub mod relay;
pub mod upstream;

pub use relay::{RelayError, RelayStats, relay};
pub use upstream::{UpstreamBody, UpstreamClient, UpstreamResponse};
