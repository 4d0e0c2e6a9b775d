//! Chunk header and chunk extension grammar, see
//! [RFC 9112 Section 7.1.1](https://www.rfc-editor.org/rfc/rfc9112#name-chunk-extensions).
//!
//! ```text
//! chunk-size = 1*HEXDIG
//! chunk-ext  = *( BWS ";" BWS ext-name [ BWS "=" BWS ext-val ] )
//! ext-val    = token / quoted-string
//! ```

use std::fmt;

use crate::protocol::ChunkError;
use crate::protocol::header::{is_tchar, is_token, is_whitespace};

/// A single `;name[=value]` chunk extension.
///
/// The value is kept in its wire form, so a quoted string keeps its quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkExtension {
    name: String,
    value: Option<String>,
}

impl ChunkExtension {
    /// Creates a bare extension without a value.
    pub fn new(name: &str) -> Result<Self, ChunkError> {
        if !is_token(name.as_bytes()) {
            return Err(ChunkError::invalid_name(name));
        }
        Ok(Self { name: name.to_owned(), value: None })
    }

    /// Creates a `name=value` extension. The value must be a token or a
    /// complete quoted string.
    pub fn with_value(name: &str, value: &str) -> Result<Self, ChunkError> {
        let mut extension = Self::new(name)?;
        extension.set_value(value)?;
        Ok(extension)
    }

    /// Parses a single extension such as `;foo=bar`.
    pub fn parse(input: &str) -> Result<Self, ChunkError> {
        let mut cursor = Cursor::new(input.as_bytes());
        let extension = cursor.extension()?;
        cursor.skip_whitespace();
        if !cursor.is_empty() {
            return Err(ChunkError::invalid_value(input));
        }
        Ok(extension)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value as it appears on the wire.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// The value with quoting and escapes removed.
    pub fn unquoted_value(&self) -> Option<String> {
        let value = self.value.as_deref()?;
        match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            Some(inner) => {
                let mut unquoted = String::with_capacity(inner.len());
                let mut escaped = false;
                for c in inner.chars() {
                    if !escaped && c == '\\' {
                        escaped = true;
                        continue;
                    }
                    escaped = false;
                    unquoted.push(c);
                }
                Some(unquoted)
            }
            None => Some(value.to_owned()),
        }
    }

    /// Replaces the value, validating it as a token or quoted string.
    pub fn set_value(&mut self, value: &str) -> Result<(), ChunkError> {
        let mut cursor = Cursor::new(value.as_bytes());
        cursor.value()?;
        if !cursor.is_empty() {
            return Err(ChunkError::invalid_value(value));
        }
        self.value = Some(value.to_owned());
        Ok(())
    }

    pub fn clear_value(&mut self) {
        self.value = None;
    }
}

impl fmt::Display for ChunkExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, ";{}={}", self.name, value),
            None => write!(f, ";{}", self.name),
        }
    }
}

/// A parsed chunk-size line: the size plus its extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkHeader {
    pub size: u64,
    pub extensions: Vec<ChunkExtension>,
}

impl ChunkHeader {
    /// Parses a chunk-size line without its trailing CRLF.
    ///
    /// Sizes above `limit` fail with [`ChunkError::SizeLimitExceeded`] before
    /// the extensions are looked at.
    pub fn parse(line: &[u8], limit: u64) -> Result<Self, ChunkError> {
        let mut cursor = Cursor::new(line);
        let size = cursor.chunk_size(limit)?;

        let mut extensions = Vec::new();
        loop {
            cursor.skip_whitespace();
            if cursor.is_empty() {
                break;
            }
            extensions.push(cursor.extension()?);
        }

        Ok(Self { size, extensions })
    }
}

impl fmt::Display for ChunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.size)?;
        for extension in &self.extensions {
            write!(f, "{extension}")?;
        }
        Ok(())
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(is_whitespace) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, predicate: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(&predicate) {
            self.pos += 1;
        }
        &self.bytes[start..self.pos]
    }

    fn chunk_size(&mut self, limit: u64) -> Result<u64, ChunkError> {
        let digits = self.take_while(|b| b.is_ascii_hexdigit());
        if digits.is_empty() {
            return Err(ChunkError::InvalidSize);
        }

        let mut size: u64 = 0;
        for digit in digits {
            let value = match digit {
                b'0'..=b'9' => digit - b'0',
                b'a'..=b'f' => digit - b'a' + 10,
                _ => digit - b'A' + 10,
            };
            size = size
                .checked_mul(16)
                .and_then(|size| size.checked_add(u64::from(value)))
                .filter(|size| *size <= limit)
                .ok_or(ChunkError::SizeLimitExceeded { limit })?;
        }

        match self.peek() {
            None | Some(b';' | b' ' | b'\t') => Ok(size),
            Some(_) => Err(ChunkError::InvalidSize),
        }
    }

    fn extension(&mut self) -> Result<ChunkExtension, ChunkError> {
        self.skip_whitespace();
        if self.peek() != Some(b';') {
            return Err(ChunkError::invalid_name(self.rest()));
        }
        self.pos += 1;
        self.skip_whitespace();

        let name = self.take_while(is_tchar);
        if name.is_empty() {
            return Err(ChunkError::invalid_name(self.rest()));
        }
        let name = String::from_utf8_lossy(name).into_owned();

        let checkpoint = self.pos;
        self.skip_whitespace();
        if self.peek() != Some(b'=') {
            self.pos = checkpoint;
            return Ok(ChunkExtension { name, value: None });
        }
        self.pos += 1;
        self.skip_whitespace();

        let value = self.value()?;
        Ok(ChunkExtension { name, value: Some(value) })
    }

    /// token / quoted-string
    fn value(&mut self) -> Result<String, ChunkError> {
        let start = self.pos;
        if self.peek() == Some(b'"') {
            self.pos += 1;
            loop {
                match self.peek() {
                    None => return Err(ChunkError::UnterminatedQuote),
                    Some(b'"') => {
                        self.pos += 1;
                        break;
                    }
                    Some(b'\\') => {
                        self.pos += 1;
                        match self.peek() {
                            Some(b) if is_qtext(b) || b == b'"' || b == b'\\' => self.pos += 1,
                            Some(_) => return Err(ChunkError::invalid_value(self.rest())),
                            None => return Err(ChunkError::UnterminatedQuote),
                        }
                    }
                    Some(b) if is_qtext(b) => self.pos += 1,
                    Some(_) => return Err(ChunkError::invalid_value(self.rest())),
                }
            }
        } else {
            let token = self.take_while(is_tchar);
            if token.is_empty() {
                return Err(ChunkError::invalid_value(self.rest()));
            }
        }

        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn rest(&self) -> String {
        String::from_utf8_lossy(&self.bytes[self.pos.min(self.bytes.len())..]).into_owned()
    }
}

/// qdtext without the obs-text range
fn is_qtext(b: u8) -> bool {
    matches!(b, b'\t' | b' ' | 0x21 | 0x23..=0x5B | 0x5D..=0x7E)
}
