//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::BytesMut;
use rawhttp::http::HeaderMap;
use rawhttp::http::chunked::{ChunkedDecoder, Decoded};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

pub enum Step {
    Data(Vec<u8>),
    Error(io::ErrorKind),
}

/// Reader that replays a fixed script of reads, then reports EOF.
pub struct ScriptedReader {
    steps: VecDeque<Step>,
}

impl ScriptedReader {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
        }
    }

    /// Delivers `data` in reads of at most `size` bytes.
    pub fn fragments(data: &[u8], size: usize) -> Self {
        Self::new(
            data.chunks(size)
                .map(|chunk| Step::Data(chunk.to_vec()))
                .collect(),
        )
    }
}

impl AsyncRead for ScriptedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.steps.pop_front() {
            None => Poll::Ready(Ok(())),
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buf.remaining());
                buf.put_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    self.steps.push_front(Step::Data(rest));
                }
                Poll::Ready(Ok(()))
            }
            Some(Step::Error(kind)) => {
                Poll::Ready(Err(io::Error::new(kind, "scripted read failure")))
            }
        }
    }
}

/// Writer that accepts a number of write calls, then fails every one after.
pub struct FailingWriter {
    pub written: Vec<u8>,
    accept_writes: usize,
}

impl FailingWriter {
    pub fn new(accept_writes: usize) -> Self {
        Self {
            written: Vec::new(),
            accept_writes,
        }
    }
}

impl AsyncWrite for FailingWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.accept_writes == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "client went away",
            )));
        }
        self.accept_writes -= 1;
        self.written.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// A response split back into its parts.
pub struct ParsedResponse {
    pub status_line: String,
    pub headers: HeaderMap,
    pub chunks: Vec<Vec<u8>>,
    pub body: Vec<u8>,
    pub trailers: HeaderMap,
    pub complete: bool,
}

/// Parses raw response bytes. Chunked bodies are decoded; anything else is
/// taken as the body verbatim.
pub fn parse_response(raw: &[u8]) -> ParsedResponse {
    let line_end = raw
        .windows(2)
        .position(|w| w == b"\r\n")
        .expect("status line");
    let status_line = String::from_utf8(raw[..line_end].to_vec()).unwrap();

    let mut headers = HeaderMap::new();
    let mut rest = &raw[line_end + 2..];
    loop {
        let (n, done) = headers.parse(rest).unwrap();
        assert!(n > 0, "truncated header block");
        rest = &rest[n..];
        if done {
            break;
        }
    }

    let mut parsed = ParsedResponse {
        status_line,
        headers,
        chunks: Vec::new(),
        body: Vec::new(),
        trailers: HeaderMap::new(),
        complete: false,
    };

    if parsed.headers.get("transfer-encoding") != Some("chunked") {
        parsed.body = rest.to_vec();
        parsed.complete = true;
        return parsed;
    }

    let mut buf = BytesMut::from(rest);
    let mut decoder = ChunkedDecoder::new();
    loop {
        match decoder.decode(&mut buf).unwrap() {
            Decoded::Data(data) => {
                parsed.body.extend_from_slice(&data);
                parsed.chunks.push(data.to_vec());
            }
            Decoded::NeedMore => break,
            Decoded::Done => {
                parsed.complete = true;
                break;
            }
        }
    }
    parsed.trailers = decoder.trailers().clone();
    parsed
}
