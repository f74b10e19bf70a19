use std::fmt;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::headers::HeaderMap;
use crate::http::request::HTTP_VERSION;
use crate::http::response::StatusCode;

const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Error)]
pub enum WriterError {
    /// The operation is not allowed in the writer's current state.
    /// Nothing was written.
    #[error("invalid writer state: {0}")]
    InvalidWriterState(WriterState),

    #[error("io error while writing response: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a [`ResponseWriter`] is in the response.
///
/// ```text
/// AwaitingStatusLine -> AwaitingHeaders -> Body -> Trailers -> Complete
/// ```
///
/// `Trailers` is only entered through a chunked body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    AwaitingStatusLine,
    AwaitingHeaders,
    Body,
    Trailers,
    Complete,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WriterState::AwaitingStatusLine => "awaiting status line",
            WriterState::AwaitingHeaders => "awaiting headers",
            WriterState::Body => "body",
            WriterState::Trailers => "trailers",
            WriterState::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Writes one response to `sink`, enforcing the order of its parts.
///
/// State only advances once an operation's bytes are fully written, so an
/// I/O error leaves the writer where it was.
#[derive(Debug)]
pub struct ResponseWriter<W> {
    sink: W,
    state: WriterState,
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            state: WriterState::AwaitingStatusLine,
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    fn expect_state(&self, required: WriterState) -> Result<(), WriterError> {
        if self.state == required {
            Ok(())
        } else {
            Err(WriterError::InvalidWriterState(self.state))
        }
    }

    pub async fn write_status_line(&mut self, status: impl Into<StatusCode>) -> Result<(), WriterError> {
        self.expect_state(WriterState::AwaitingStatusLine)?;

        let status = status.into();
        let line = format!(
            "{} {} {}\r\n",
            HTTP_VERSION,
            status.as_u16(),
            status.reason_phrase()
        );
        self.sink.write_all(line.as_bytes()).await?;

        self.state = WriterState::AwaitingHeaders;
        Ok(())
    }

    pub async fn write_headers(&mut self, headers: &HeaderMap) -> Result<(), WriterError> {
        self.expect_state(WriterState::AwaitingHeaders)?;

        self.sink.write_all(&serialize_fields(headers)).await?;

        self.state = WriterState::Body;
        Ok(())
    }

    /// Writes raw body bytes. May be called any number of times.
    pub async fn write_body(&mut self, body: &[u8]) -> Result<usize, WriterError> {
        self.expect_state(WriterState::Body)?;

        self.sink.write_all(body).await?;
        Ok(body.len())
    }

    /// Writes `data` as one chunk frame and returns the bytes put on the
    /// wire, framing included.
    ///
    /// Empty `data` writes nothing; a zero-size frame would end the body.
    pub async fn write_chunked_body(&mut self, data: &[u8]) -> Result<usize, WriterError> {
        self.expect_state(WriterState::Body)?;
        if data.is_empty() {
            return Ok(0);
        }

        let size_line = format!("{:x}\r\n", data.len());
        let mut frame = Vec::with_capacity(size_line.len() + data.len() + CRLF.len());
        frame.extend_from_slice(size_line.as_bytes());
        frame.extend_from_slice(data);
        frame.extend_from_slice(CRLF);

        self.sink.write_all(&frame).await?;
        Ok(frame.len())
    }

    /// Writes the zero-size chunk that ends a chunked body.
    pub async fn write_chunked_body_done(&mut self) -> Result<usize, WriterError> {
        self.expect_state(WriterState::Body)?;

        const LAST_CHUNK: &[u8] = b"0\r\n";
        self.sink.write_all(LAST_CHUNK).await?;

        self.state = WriterState::Trailers;
        Ok(LAST_CHUNK.len())
    }

    /// Writes trailer fields and the blank line that ends the message.
    ///
    /// An empty map is valid and just terminates the chunked body.
    pub async fn write_trailers(&mut self, trailers: &HeaderMap) -> Result<(), WriterError> {
        self.expect_state(WriterState::Trailers)?;

        self.sink.write_all(&serialize_fields(trailers)).await?;

        self.state = WriterState::Complete;
        Ok(())
    }

    /// Flushes and hands back the sink.
    ///
    /// Only a response sitting in `Body` (fixed-length) or `Complete` can
    /// be finished.
    pub async fn finish(mut self) -> Result<W, WriterError> {
        match self.state {
            WriterState::Body | WriterState::Complete => {
                self.sink.flush().await?;
                Ok(self.sink)
            }
            state => Err(WriterError::InvalidWriterState(state)),
        }
    }
}

fn serialize_fields(fields: &HeaderMap) -> Vec<u8> {
    let mut buf = Vec::new();

    for (k, v) in fields {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(CRLF);
    }

    buf.extend_from_slice(CRLF);
    buf
}
