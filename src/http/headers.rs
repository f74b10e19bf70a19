use std::collections::HashMap;
use std::collections::hash_map;

use crate::http::parser::ParseError;

const CRLF: &[u8] = b"\r\n";

/// Header (or trailer) fields keyed by lowercase field name.
///
/// Every key is lowercased on the way in, so lookups are case-insensitive.
/// A field set more than once keeps a single entry whose value is the
/// comma-joined list of everything that was set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    fields: HashMap<String, String>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, merging with any existing value as `"old, new"`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.entry(name.to_ascii_lowercase()) {
            hash_map::Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.push_str(", ");
                existing.push_str(&value);
            }
            hash_map::Entry::Vacant(entry) => {
                entry.insert(value);
            }
        }
    }

    /// Sets a field, discarding any existing value.
    pub fn replace(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.fields.remove(&name.to_ascii_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses a single field-line from the front of `data`.
    ///
    /// Returns the number of bytes consumed and whether the blank line that
    /// ends the block was reached. `(0, false)` means no complete line is
    /// available yet and the caller should retry with more bytes.
    pub fn parse(&mut self, data: &[u8]) -> Result<(usize, bool), ParseError> {
        let Some(idx) = find_crlf(data) else {
            return Ok((0, false));
        };

        if idx == 0 {
            return Ok((CRLF.len(), true));
        }

        let (name, value) = parse_field_line(&data[..idx])?;
        self.set(&name, value);

        Ok((idx + CRLF.len(), false))
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = (&'a String, &'a String);
    type IntoIter = hash_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

pub(crate) fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(CRLF.len()).position(|w| w == CRLF)
}

fn parse_field_line(line: &[u8]) -> Result<(String, String), ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::MalformedFieldLine)?;
    let line = line.trim();

    let (name, value) = line
        .split_once(':')
        .ok_or(ParseError::MalformedFieldLine)?;

    // "Host : x" is ambiguous with obsolete line folding
    if name.ends_with(|c: char| c.is_ascii_whitespace()) {
        return Err(ParseError::MalformedFieldLine);
    }

    if name.is_empty() || !name.bytes().all(is_token_char) {
        return Err(ParseError::InvalidFieldName);
    }

    Ok((name.to_ascii_lowercase(), value.trim().to_string()))
}

fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
