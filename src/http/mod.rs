//! HTTP/1.1 message layer.
//!
//! Requests are parsed and responses written directly on byte streams,
//! without any HTTP library underneath.
//!
//! # Architecture
//!
//! - **`accumulator`**: Buffers socket reads and feeds them to the parser
//! - **`request`**: The `Request` type and request-line parsing
//! - **`headers`**: `HeaderMap` and field-line parsing
//! - **`parser`**: The incremental request-head state machine
//! - **`response`**: Status codes and default response headers
//! - **`writer`**: The response writer state machine, chunked bodies and trailers
//! - **`chunked`**: Decoder for chunked bodies
//! - **`connection`**: Drives one request/response exchange on a socket
//!
//! # Request parsing
//!
//! ```text
//!        ┌──────────────────────┐
//!        │ AwaitingRequestLine  │ ← "GET /path HTTP/1.1\r\n"
//!        └──────────┬───────────┘
//!                   ▼
//!        ┌──────────────────────┐
//!        │   AwaitingHeaders    │ ← "Name: value\r\n" ... "\r\n"
//!        └──────────┬───────────┘
//!                   ▼
//!        ┌──────────────────────┐
//!        │         Done         │
//!        └──────────────────────┘
//! ```
//!
//! # Response writing
//!
//! ```text
//! AwaitingStatusLine → AwaitingHeaders → Body ─┬─────────────────────────→ (finish)
//!                                              └─ 0\r\n → Trailers → Complete
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rawhttp::http::accumulator::read_request;
//! use rawhttp::http::response::{StatusCode, default_headers};
//! use rawhttp::http::writer::ResponseWriter;
//! use tokio::net::TcpListener;
//!
//! # async fn serve() -> anyhow::Result<()> {
//! let listener = TcpListener::bind("127.0.0.1:42069").await?;
//! let (mut socket, _addr) = listener.accept().await?;
//!
//! let request = read_request(&mut socket).await?;
//! let body = format!("you asked for {}\n", request.target());
//!
//! let mut writer = ResponseWriter::new(&mut socket);
//! writer.write_status_line(StatusCode::Ok).await?;
//! writer.write_headers(&default_headers(body.len())).await?;
//! writer.write_body(body.as_bytes()).await?;
//! writer.finish().await?;
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod chunked;
pub mod connection;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

pub use headers::HeaderMap;
pub use parser::{ParseError, ParserState};
pub use request::{Request, RequestLine};
pub use writer::{ResponseWriter, WriterError, WriterState};
