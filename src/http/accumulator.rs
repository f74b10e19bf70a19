use tokio::io::{AsyncRead, AsyncReadExt};

use crate::http::parser::{ParseError, RequestParser};
use crate::http::request::Request;

/// Starting size of the read buffer. Deliberately tiny; it doubles on demand.
pub const INITIAL_BUFFER_SIZE: usize = 8;

/// Holds socket bytes the parser has not consumed yet.
///
/// `buffer[..filled]` is live data. When the buffer is full and the parser
/// still cannot make progress the capacity doubles before the next read.
#[derive(Debug)]
pub struct Accumulator {
    buffer: Vec<u8>,
    filled: usize,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::with_capacity(INITIAL_BUFFER_SIZE)
    }
}

impl Accumulator {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity.max(1)],
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn filled(&self) -> &[u8] {
        &self.buffer[..self.filled]
    }

    /// Reads once from `reader` into the free tail of the buffer.
    pub async fn fill_from<R>(&mut self, reader: &mut R) -> std::io::Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        if self.filled == self.buffer.len() {
            let doubled = self.buffer.len() * 2;
            self.buffer.resize(doubled, 0);
        }

        let n = reader.read(&mut self.buffer[self.filled..]).await?;
        self.filled += n;
        Ok(n)
    }

    /// Shifts the first `n` bytes out of the buffer.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.filled);
        self.buffer.copy_within(n..self.filled, 0);
        self.filled -= n;
    }
}

/// Reads from `reader` until a full request head has been parsed.
///
/// Bytes past the end of the head stay unread in the accumulator and are
/// dropped with it.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, ParseError>
where
    R: AsyncRead + Unpin,
{
    let mut acc = Accumulator::default();
    let mut parser = RequestParser::new();

    while !parser.is_done() {
        let n = acc.fill_from(reader).await?;
        if n == 0 {
            return Err(ParseError::IncompleteMessage {
                state: parser.state(),
            });
        }

        let consumed = parser.parse(acc.filled())?;
        acc.consume(consumed);
    }

    let state = parser.state();
    let request = parser
        .into_request()
        .ok_or(ParseError::IncompleteMessage { state })?;

    tracing::trace!(
        method = %request.method(),
        path = %request.target(),
        "Request head parsed"
    );

    Ok(request)
}
