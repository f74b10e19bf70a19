use std::fmt;

use thiserror::Error;

use crate::http::request::{Request, parse_request_line};

/// Errors produced while turning inbound bytes into a [`Request`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The stream ended before the request head was complete.
    #[error("incomplete request: stream ended while {state}")]
    IncompleteMessage { state: ParserState },

    #[error("malformed request line")]
    MalformedRequestLine,

    #[error("invalid method")]
    InvalidMethod,

    #[error("unsupported HTTP version")]
    UnsupportedVersion,

    #[error("malformed field line")]
    MalformedFieldLine,

    #[error("invalid field name")]
    InvalidFieldName,

    /// `parse` was called on a parser that already produced its request.
    #[error("parse called after the request was complete")]
    ParseAfterDone,

    #[error("io error while reading request: {0}")]
    Io(#[from] std::io::Error),
}

/// Progress of a [`RequestParser`]. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    AwaitingRequestLine,
    AwaitingHeaders,
    Done,
}

impl fmt::Display for ParserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParserState::AwaitingRequestLine => "awaiting request line",
            ParserState::AwaitingHeaders => "awaiting headers",
            ParserState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Incremental request-head parser.
///
/// Feed it whatever prefix of the stream is buffered; it reports how many
/// bytes it consumed so the caller can drop them and keep reading.
#[derive(Debug)]
pub struct RequestParser {
    state: ParserState,
    request: Request,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::AwaitingRequestLine,
            request: Request::default(),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ParserState::Done
    }

    /// Consumes as much of `data` as currently possible.
    ///
    /// Keeps stepping until a step makes no progress or the head is done,
    /// so one large read can carry the request line and every header.
    pub fn parse(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        if self.is_done() {
            return Err(ParseError::ParseAfterDone);
        }

        let mut total = 0;
        while !self.is_done() {
            let n = self.parse_single(&data[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }

        Ok(total)
    }

    fn parse_single(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        match self.state {
            ParserState::AwaitingRequestLine => match parse_request_line(data)? {
                Some((line, n)) => {
                    self.request.line = line;
                    self.state = ParserState::AwaitingHeaders;
                    Ok(n)
                }
                None => Ok(0),
            },
            ParserState::AwaitingHeaders => {
                let (n, done) = self.request.headers.parse(data)?;
                if done {
                    self.state = ParserState::Done;
                }
                Ok(n)
            }
            ParserState::Done => Err(ParseError::ParseAfterDone),
        }
    }

    /// Hands over the finished request.
    ///
    /// Returns `None` until the parser has reached [`ParserState::Done`].
    pub fn into_request(self) -> Option<Request> {
        self.is_done().then_some(self.request)
    }
}
