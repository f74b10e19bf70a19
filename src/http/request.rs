use crate::http::headers::{HeaderMap, find_crlf};
use crate::http::parser::ParseError;

/// The only protocol identifier the server accepts on a request line.
pub const HTTP_VERSION: &str = "HTTP/1.1";

/// Method, target and version from the first line of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLine {
    /// Request method, e.g. "GET". Always uppercase ASCII letters.
    pub method: String,
    /// The request target exactly as sent, e.g. "/httpbin/stream/3"
    pub target: String,
    /// Protocol version without the "HTTP/" prefix, i.e. "1.1"
    pub version: String,
}

/// A parsed HTTP request head.
///
/// Bodies are never read; the request ends at the blank line after the
/// header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub line: RequestLine,
    pub headers: HeaderMap,
}

impl Request {
    pub fn method(&self) -> &str {
        &self.line.method
    }

    pub fn target(&self) -> &str {
        &self.line.target
    }

    pub fn version(&self) -> &str {
        &self.line.version
    }

    /// Retrieves a header value by name, ignoring case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }
}

/// Parses a request line from the front of `data`.
///
/// Returns `Ok(None)` when no CRLF has arrived yet. On success, the
/// consumed count includes the trailing CRLF.
pub fn parse_request_line(data: &[u8]) -> Result<Option<(RequestLine, usize)>, ParseError> {
    let Some(idx) = find_crlf(data) else {
        return Ok(None);
    };

    let line = std::str::from_utf8(&data[..idx]).map_err(|_| ParseError::MalformedRequestLine)?;
    let request_line = request_line_from_str(line)?;

    Ok(Some((request_line, idx + 2)))
}

fn request_line_from_str(line: &str) -> Result<RequestLine, ParseError> {
    let parts: Vec<&str> = line.split(' ').collect();
    let &[method, target, version] = parts.as_slice() else {
        return Err(ParseError::MalformedRequestLine);
    };

    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(ParseError::InvalidMethod);
    }

    if version != HTTP_VERSION {
        return Err(ParseError::UnsupportedVersion);
    }

    Ok(RequestLine {
        method: method.to_string(),
        target: target.to_string(),
        version: version.trim_start_matches("HTTP/").to_string(),
    })
}
