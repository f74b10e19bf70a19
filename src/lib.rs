//! rawhttp - HTTP/1.1 over raw TCP streams
//!
//! Core library for request parsing, response writing and the chunked
//! proxy relay.

pub mod config;
pub mod http;
pub mod proxy;
pub mod server;
