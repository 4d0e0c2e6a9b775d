//! Header field tokens.
//!
//! A [`HeaderField`] is a validated, normalized `name: value` pair:
//!
//! - the name only holds token characters (TCHAR, RFC 7230 §3.2.6)
//! - the value only holds visible characters plus SP/HTAB, trimmed at both ends
//! - an obsolete line fold (a continuation line starting with SP/HTAB) is
//!   collapsed into a single space
//!
//! Fields created from a [`FieldName`] skip name validation and always use the
//! canonical display casing of that name.

use std::fmt;

use crate::protocol::HeaderError;

/// Returns true for the RFC 7230 `tchar` class.
#[inline]
pub const fn is_tchar(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
    ) || b.is_ascii_alphanumeric()
}

/// Returns true for the RFC 5234 `VCHAR` class.
#[inline]
pub const fn is_vchar(b: u8) -> bool {
    matches!(b, 0x21..=0x7E)
}

#[inline]
pub(crate) const fn is_whitespace(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

#[inline]
const fn is_field_char(b: u8) -> bool {
    is_vchar(b) || is_whitespace(b)
}

pub(crate) fn is_token(s: &[u8]) -> bool {
    !s.is_empty() && s.iter().all(|b| is_tchar(*b))
}

macro_rules! field_names {
    ($($variant:ident => $name:literal,)+) => {
        /// Header names known to this crate.
        ///
        /// Fields built from a known name are trusted: the name is not validated
        /// and is rendered in the casing listed here.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum FieldName {
            $($variant,)+
        }

        impl FieldName {
            const ALL: &'static [FieldName] = &[$(FieldName::$variant,)+];

            /// The canonical display casing of this name.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(FieldName::$variant => $name,)+
                }
            }
        }
    };
}

field_names! {
    Accept => "Accept",
    Authorization => "Authorization",
    CacheControl => "Cache-Control",
    Connection => "Connection",
    ContentEncoding => "Content-Encoding",
    ContentLength => "Content-Length",
    ContentRange => "Content-Range",
    ContentType => "Content-Type",
    Cookie => "Cookie",
    Date => "Date",
    Expect => "Expect",
    Host => "Host",
    MaxForwards => "Max-Forwards",
    Origin => "Origin",
    Pragma => "Pragma",
    Range => "Range",
    SecWebSocketAccept => "Sec-WebSocket-Accept",
    SecWebSocketExtensions => "Sec-WebSocket-Extensions",
    SecWebSocketKey => "Sec-WebSocket-Key",
    SecWebSocketProtocol => "Sec-WebSocket-Protocol",
    SecWebSocketVersion => "Sec-WebSocket-Version",
    Server => "Server",
    SetCookie => "Set-Cookie",
    Te => "TE",
    Trailer => "Trailer",
    TransferEncoding => "Transfer-Encoding",
    Upgrade => "Upgrade",
    UserAgent => "User-Agent",
}

impl FieldName {
    /// Looks up a known name, ignoring ASCII case.
    pub fn lookup(name: &str) -> Option<FieldName> {
        Self::ALL.iter().copied().find(|known| known.as_str().eq_ignore_ascii_case(name))
    }

    /// Whether a field with this name determines the message body size.
    pub const fn describes_body_size(&self) -> bool {
        matches!(self, FieldName::ContentLength | FieldName::TransferEncoding)
    }

    /// Case-insensitive comparison against a raw field name.
    #[inline]
    pub fn matches(&self, name: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validated header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    name: String,
    value: String,
    describes_body_size: bool,
}

impl HeaderField {
    /// Creates a field from an explicit name and value.
    ///
    /// The name is validated and rendered in display casing (`content-type`
    /// becomes `Content-Type`); the value is validated and trimmed.
    pub fn new(name: &str, value: &str) -> Result<Self, HeaderError> {
        if !is_token(name.as_bytes()) {
            return Err(HeaderError::invalid_name(name));
        }

        let name = match FieldName::lookup(name) {
            Some(known) => known.as_str().to_owned(),
            None => display_case(name),
        };

        Ok(Self::from_parts(name, validate_value(value.as_bytes())?))
    }

    /// Creates a field from a known name. Only the value is validated.
    pub fn known(name: FieldName, value: &str) -> Result<Self, HeaderError> {
        Ok(Self::from_parts(name.as_str().to_owned(), validate_value(value.as_bytes())?))
    }

    /// Parses a raw field line such as `name: value\r\n`.
    ///
    /// The trailing CRLF is optional. Continuation lines beginning with SP or
    /// HTAB are folded into the value with a single space. The name keeps the
    /// casing it had on the wire.
    pub fn parse(line: &[u8]) -> Result<Self, HeaderError> {
        let colon = line.iter().position(|b| *b == b':').ok_or(HeaderError::MissingColon)?;
        let (name, rest) = (&line[..colon], &line[colon + 1..]);

        if !is_token(name) {
            return Err(HeaderError::invalid_name(String::from_utf8_lossy(name)));
        }

        let rest = rest.strip_suffix(b"\r\n").unwrap_or(rest);

        let mut value = String::with_capacity(rest.len());
        for (index, segment) in split_crlf(rest).enumerate() {
            if index > 0 && !segment.first().is_some_and(|b| is_whitespace(*b)) {
                return Err(HeaderError::MalformedFold);
            }

            let segment = validate_value(segment)?;
            if segment.is_empty() {
                continue;
            }
            if !value.is_empty() {
                value.push(' ');
            }
            value.push_str(&segment);
        }

        // token characters are ASCII
        let name = String::from_utf8_lossy(name).into_owned();
        Ok(Self::from_parts(name, value))
    }

    fn from_parts(name: String, value: String) -> Self {
        let describes_body_size =
            FieldName::ContentLength.matches(&name) || FieldName::TransferEncoding.matches(&name);
        Self { name, value, describes_body_size }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// True for `Content-Length` and `Transfer-Encoding`.
    pub fn describes_body_size(&self) -> bool {
        self.describes_body_size
    }

    /// Case-insensitive name comparison.
    pub fn is(&self, name: FieldName) -> bool {
        name.matches(&self.name)
    }

    /// Replaces the value, validating and trimming it.
    pub fn set_value(&mut self, value: &str) -> Result<(), HeaderError> {
        self.value = validate_value(value.as_bytes())?;
        Ok(())
    }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}\r\n", self.name, self.value)
    }
}

/// Validates a field value and returns it without surrounding whitespace.
fn validate_value(value: &[u8]) -> Result<String, HeaderError> {
    if let Some(byte) = value.iter().copied().find(|b| !is_field_char(*b)) {
        return Err(HeaderError::InvalidValue { byte });
    }

    // all bytes are ASCII at this point
    Ok(String::from_utf8_lossy(value.trim_ascii()).into_owned())
}

fn split_crlf(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = Some(bytes);
    std::iter::from_fn(move || {
        let current = rest?;
        match current.windows(2).position(|w| w == b"\r\n") {
            Some(pos) => {
                rest = Some(&current[pos + 2..]);
                Some(&current[..pos])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

/// `content-type` -> `Content-Type`
fn display_case(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() };
            upper = c == '-';
            mapped
        })
        .collect()
}

/// An ordered list of header fields.
///
/// Duplicate names are allowed; lookups ignore ASCII case and return the first
/// match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    fields: Vec<HeaderField>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { fields: Vec::with_capacity(capacity) }
    }

    pub fn push(&mut self, field: HeaderField) {
        self.fields.push(field);
    }

    /// Value of the first field named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter().find(|field| field.name.eq_ignore_ascii_case(name)).map(HeaderField::value)
    }

    /// Value of the first field with a known name.
    pub fn get_known(&self, name: FieldName) -> Option<&str> {
        self.get(name.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.iter().filter(move |field| field.name.eq_ignore_ascii_case(name)).map(HeaderField::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes every field named `name`, returning how many were dropped.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.fields.len();
        self.fields.retain(|field| !field.name.eq_ignore_ascii_case(name));
        before - self.fields.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HeaderField> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

impl<'a> IntoIterator for &'a HeaderList {
    type Item = &'a HeaderField;
    type IntoIter = std::slice::Iter<'a, HeaderField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl IntoIterator for HeaderList {
    type Item = HeaderField;
    type IntoIter = std::vec::IntoIter<HeaderField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl FromIterator<HeaderField> for HeaderList {
    fn from_iter<T: IntoIterator<Item = HeaderField>>(iter: T) -> Self {
        Self { fields: iter.into_iter().collect() }
    }
}

impl Extend<HeaderField> for HeaderList {
    fn extend<T: IntoIterator<Item = HeaderField>>(&mut self, iter: T) {
        self.fields.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_name_uses_display_case() {
        let field = HeaderField::new("name", "value").unwrap();
        assert_eq!(field.name(), "Name");
        assert_eq!(field.value(), "value");

        let field = HeaderField::new("x-request-ID", "1").unwrap();
        assert_eq!(field.name(), "X-Request-Id");

        let field = HeaderField::new("sec-websocket-key", "abc").unwrap();
        assert_eq!(field.name(), "Sec-WebSocket-Key");
    }

    #[test]
    fn value_is_trimmed() {
        let field = HeaderField::new("name", "\tset value ").unwrap();
        assert_eq!(field.value(), "set value");
    }

    #[test]
    fn known_name_skips_validation() {
        let field = HeaderField::known(FieldName::Connection, "value").unwrap();
        assert_eq!(field.name(), "Connection");
        assert_eq!(field.value(), "value");
        assert!(!field.describes_body_size());

        assert!(HeaderField::known(FieldName::ContentLength, "3").unwrap().describes_body_size());
        assert!(HeaderField::known(FieldName::Host, "\x7F").is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert_eq!(HeaderField::new("/bad", "value"), Err(HeaderError::invalid_name("/bad")));
        assert_eq!(HeaderField::new("name", "\x7F"), Err(HeaderError::InvalidValue { byte: 0x7F }));
        assert!(HeaderField::new("", "value").is_err());
    }

    #[test]
    fn parses_raw_line() {
        let field = HeaderField::parse(b"name: value\r\n").unwrap();
        assert_eq!(field.name(), "name");
        assert_eq!(field.value(), "value");

        let field = HeaderField::parse(b"Transfer-Encoding:gzip, chunked  ").unwrap();
        assert_eq!(field.value(), "gzip, chunked");
        assert!(field.describes_body_size());

        let field = HeaderField::parse(b"Empty:\r\n").unwrap();
        assert_eq!(field.value(), "");
    }

    #[test]
    fn folds_obsolete_continuation() {
        let field = HeaderField::parse(b"name: value,\r\n\tvalue2\r\n").unwrap();
        assert_eq!(field.name(), "name");
        assert_eq!(field.value(), "value, value2");

        let field = HeaderField::parse(b"name: a\r\n  b\r\n \tc\r\n").unwrap();
        assert_eq!(field.value(), "a b c");
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(HeaderField::parse(b"name : bad\r\n").is_err());
        assert_eq!(HeaderField::parse(b"name: bad,\r\nvalue\r\n"), Err(HeaderError::MalformedFold));
        assert_eq!(HeaderField::parse(b"no separator\r\n"), Err(HeaderError::MissingColon));
        assert!(HeaderField::parse(b"name: bare\nfeed\r\n").is_err());
    }

    #[test]
    fn header_list_lookup() {
        let mut headers = HeaderList::new();
        headers.push(HeaderField::parse(b"host: a").unwrap());
        headers.push(HeaderField::parse(b"Accept: x").unwrap());
        headers.push(HeaderField::parse(b"accept: y").unwrap());

        assert_eq!(headers.get("Host"), Some("a"));
        assert_eq!(headers.get_known(FieldName::Accept), Some("x"));
        assert_eq!(headers.get_all("ACCEPT").collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(headers.remove("accept"), 2);
        assert_eq!(headers.len(), 1);
        assert!(!headers.contains("accept"));
    }
}
