//! Decoding of `Transfer-Encoding: chunked` bodies.
//!
//! ```text
//! <hex-size>[;ext]\r\n<payload>\r\n ... 0\r\n[<field-line>\r\n]*\r\n
//! ```

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

use crate::http::headers::{HeaderMap, find_crlf};
use crate::http::parser::ParseError;

#[derive(Debug, Error)]
pub enum ChunkedError {
    #[error("invalid chunk size line")]
    InvalidChunkSize,

    #[error("missing CRLF after chunk data")]
    MissingChunkTerminator,

    #[error("invalid trailer: {0}")]
    InvalidTrailer(#[from] ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Size,
    Data(usize),
    DataEnd,
    Trailers,
    Done,
}

/// One step of decoder output.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// Payload bytes, in order.
    Data(Bytes),
    /// The buffer holds no complete unit; read more and call again.
    NeedMore,
    /// The last chunk and the trailer section have been read.
    Done,
}

/// Incremental chunked-body decoder.
///
/// Works on a caller-owned [`BytesMut`] and splits off what it consumes, so
/// the buffer can be refilled between calls.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: State,
    trailers: HeaderMap,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Size,
            trailers: HeaderMap::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    pub fn trailers(&self) -> &HeaderMap {
        &self.trailers
    }

    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Decoded, ChunkedError> {
        loop {
            match self.state {
                State::Size => {
                    let Some(idx) = find_crlf(buf) else {
                        return Ok(Decoded::NeedMore);
                    };
                    let size = parse_chunk_size(&buf[..idx])?;
                    buf.advance(idx + 2);

                    self.state = if size == 0 {
                        State::Trailers
                    } else {
                        State::Data(size)
                    };
                }
                State::Data(remaining) => {
                    if buf.is_empty() {
                        return Ok(Decoded::NeedMore);
                    }
                    let take = remaining.min(buf.len());
                    let data = buf.split_to(take).freeze();

                    self.state = if take == remaining {
                        State::DataEnd
                    } else {
                        State::Data(remaining - take)
                    };
                    return Ok(Decoded::Data(data));
                }
                State::DataEnd => {
                    if buf.len() < 2 {
                        return Ok(Decoded::NeedMore);
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(ChunkedError::MissingChunkTerminator);
                    }
                    buf.advance(2);
                    self.state = State::Size;
                }
                State::Trailers => {
                    let (n, done) = self.trailers.parse(buf)?;
                    if n == 0 {
                        return Ok(Decoded::NeedMore);
                    }
                    buf.advance(n);
                    if done {
                        self.state = State::Done;
                    }
                }
                State::Done => return Ok(Decoded::Done),
            }
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, ChunkedError> {
    let line = std::str::from_utf8(line).map_err(|_| ChunkedError::InvalidChunkSize)?;
    let size = line.split(';').next().unwrap_or_default().trim();

    if size.is_empty() {
        return Err(ChunkedError::InvalidChunkSize);
    }

    usize::from_str_radix(size, 16).map_err(|_| ChunkedError::InvalidChunkSize)
}
