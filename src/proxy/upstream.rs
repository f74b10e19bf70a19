//! Upstream connection and response reading
//!
//! Connects to the configured upstream server over plain TCP, sends a
//! `GET` for the proxied path and exposes the response body as a byte
//! stream that the relay can pull from.

use std::io;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll, ready};
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use crate::config::Config;
use crate::http::chunked::{ChunkedDecoder, Decoded};
use crate::http::headers::HeaderMap;

/// Request targets under this prefix are forwarded upstream.
pub const PROXY_PREFIX: &str = "/httpbin";

/// Default buffer size for reading from the upstream socket
const BUFFER_SIZE: usize = 8192;

/// Response heads larger than this are refused
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Opens upstream responses for proxied request targets.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    base: Url,
    connect_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url).context("Invalid upstream URL")?;

        if base.scheme() != "http" {
            anyhow::bail!("Unsupported upstream scheme: {}", base.scheme());
        }
        base.host_str().context("Upstream URL missing host")?;

        // Url::join replaces the last segment unless the path ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            connect_timeout,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            &cfg.upstream_url,
            Duration::from_secs(cfg.upstream_connect_timeout_secs),
        )
    }

    /// Maps `/httpbin/<rest>` to `<base><rest>`.
    pub fn url_for(&self, target: &str) -> Result<Url> {
        let rest = target.strip_prefix(PROXY_PREFIX).unwrap_or(target);
        let rest = rest.trim_start_matches('/');

        self.base
            .join(rest)
            .with_context(|| format!("Invalid proxied target: {target}"))
    }

    /// Connects upstream, sends the request and reads the response head.
    pub async fn open(&self, target: &str) -> Result<UpstreamResponse<TcpStream>> {
        let url = self.url_for(target)?;

        let host = url.host_str().context("Upstream URL missing host")?;
        let port = url.port_or_known_default().unwrap_or(80);
        let addr = format!("{}:{}", host, port);

        let mut stream = timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .context("Connection timeout")?
            .context("Failed to connect to upstream")?;

        tracing::debug!(upstream = %url, "Connected to upstream");

        stream.write_all(&build_request(&url)?).await?;
        stream.flush().await?;

        let response = read_response_head(stream).await?;
        tracing::debug!(
            upstream = %url,
            status = response.status,
            "Upstream response head received"
        );

        Ok(response)
    }
}

/// Builds the `GET` request sent upstream for `url`.
pub fn build_request(url: &Url) -> Result<Vec<u8>> {
    let host = url.host_str().context("Upstream URL missing host")?;
    let host = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }

    let mut headers = HeaderMap::new();
    headers.set("Host", host);
    headers.set("Connection", "close");
    headers.set("Accept", "*/*");

    let mut buffer = format!("GET {} HTTP/1.1\r\n", path).into_bytes();
    for (key, value) in &headers {
        buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
    }
    buffer.extend_from_slice(b"\r\n");

    Ok(buffer)
}

/// Status, headers and body of an upstream response.
#[derive(Debug)]
pub struct UpstreamResponse<S> {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: UpstreamBody<S>,
}

/// Reads a response head from `stream`.
///
/// Any bytes read past the head are kept as the start of the body.
pub async fn read_response_head<S>(mut stream: S) -> Result<UpstreamResponse<S>>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        if let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = buffer.split_to(end + 4);
            let (status, headers) = parse_response_head(&head)?;
            let framing = Framing::from_headers(&headers)?;

            return Ok(UpstreamResponse {
                status,
                headers,
                body: UpstreamBody::new(stream, buffer, framing),
            });
        }

        // Prevent unbounded header growth
        if buffer.len() > MAX_HEAD_SIZE {
            anyhow::bail!("Upstream response head too large");
        }

        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            anyhow::bail!("Upstream closed before complete response head received");
        }
    }
}

fn parse_response_head(head: &[u8]) -> Result<(u16, HeaderMap)> {
    let line_end = head
        .windows(2)
        .position(|w| w == b"\r\n")
        .context("Empty upstream response")?;

    let status_line =
        std::str::from_utf8(&head[..line_end]).context("Invalid UTF-8 in upstream status line")?;
    let parts: Vec<&str> = status_line.splitn(3, ' ').collect();
    if parts.len() < 2 || !parts[0].starts_with("HTTP/") {
        anyhow::bail!("Invalid upstream status line: {}", status_line);
    }
    let status: u16 = parts[1].parse().context("Invalid upstream status code")?;

    let mut headers = HeaderMap::new();
    let mut rest = &head[line_end + 2..];
    loop {
        let (n, done) = headers
            .parse(rest)
            .context("Invalid upstream header")?;
        if done {
            break;
        }
        if n == 0 {
            anyhow::bail!("Truncated upstream response head");
        }
        rest = &rest[n..];
    }

    Ok((status, headers))
}

/// How the end of an upstream body is found.
#[derive(Debug)]
pub enum Framing {
    Chunked(ChunkedDecoder),
    Length(usize),
    Close,
}

impl Framing {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        let chunked = headers
            .get("transfer-encoding")
            .is_some_and(|te| {
                te.split(',')
                    .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
            });
        if chunked {
            return Ok(Framing::Chunked(ChunkedDecoder::new()));
        }

        match headers.get("content-length") {
            Some(cl) => {
                let length = cl
                    .parse()
                    .with_context(|| format!("Invalid upstream Content-Length: {cl}"))?;
                Ok(Framing::Length(length))
            }
            None => Ok(Framing::Close),
        }
    }
}

/// The body of an upstream response, with its transfer framing removed.
///
/// Reads yield payload bytes only and return 0 once the body ends.
#[derive(Debug)]
pub struct UpstreamBody<S> {
    stream: S,
    buffer: BytesMut,
    pending: Bytes,
    framing: Framing,
    eof: bool,
}

enum Step {
    Ready,
    NeedMore,
}

impl<S> UpstreamBody<S> {
    pub fn new(stream: S, buffered: BytesMut, framing: Framing) -> Self {
        Self {
            stream,
            buffer: buffered,
            pending: Bytes::new(),
            framing,
            eof: false,
        }
    }

    /// Trailers sent by a chunked upstream, once the body has been read.
    pub fn trailers(&self) -> Option<&HeaderMap> {
        match &self.framing {
            Framing::Chunked(decoder) if decoder.is_done() => Some(decoder.trailers()),
            _ => None,
        }
    }

    /// Moves already-buffered payload into `out`. `Ready` with nothing
    /// written means the body has ended.
    fn take_buffered(&mut self, out: &mut ReadBuf<'_>) -> io::Result<Step> {
        match &mut self.framing {
            Framing::Length(remaining) => {
                if *remaining == 0 {
                    return Ok(Step::Ready);
                }
                if self.buffer.is_empty() {
                    return Ok(Step::NeedMore);
                }
                let n = self.buffer.len().min(*remaining).min(out.remaining());
                out.put_slice(&self.buffer[..n]);
                self.buffer.advance(n);
                *remaining -= n;
                Ok(Step::Ready)
            }
            Framing::Close => {
                if self.buffer.is_empty() {
                    return Ok(Step::NeedMore);
                }
                let n = self.buffer.len().min(out.remaining());
                out.put_slice(&self.buffer[..n]);
                self.buffer.advance(n);
                Ok(Step::Ready)
            }
            Framing::Chunked(decoder) => loop {
                if !self.pending.is_empty() {
                    let n = self.pending.len().min(out.remaining());
                    out.put_slice(&self.pending[..n]);
                    self.pending.advance(n);
                    return Ok(Step::Ready);
                }

                match decoder
                    .decode(&mut self.buffer)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
                {
                    Decoded::Data(data) => self.pending = data,
                    Decoded::NeedMore => return Ok(Step::NeedMore),
                    Decoded::Done => return Ok(Step::Ready),
                }
            },
        }
    }
}

impl<S> AsyncRead for UpstreamBody<S>
where
    S: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            if let Step::Ready = this.take_buffered(out)? {
                return Poll::Ready(Ok(()));
            }

            if this.eof {
                return match this.framing {
                    Framing::Close => Poll::Ready(Ok(())),
                    _ => Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "upstream closed before end of body",
                    ))),
                };
            }

            let mut chunk = [0u8; BUFFER_SIZE];
            let mut read_buf = ReadBuf::new(&mut chunk);
            ready!(Pin::new(&mut this.stream).poll_read(cx, &mut read_buf))?;

            if read_buf.filled().is_empty() {
                this.eof = true;
            } else {
                this.buffer.extend_from_slice(read_buf.filled());
            }
        }
    }
}
