use std::fmt;
use std::str::FromStr;

use crate::error::HandshakeError;

const PORT: u16 = 80;
const SECURE_PORT: u16 = 443;

/// The endpoint a websocket connection talks to.
///
/// ```
/// use strand_ws::Uri;
///
/// let uri: Uri = "wss://example.com/chat?room=1".parse().unwrap();
/// assert!(uri.secure);
/// assert_eq!(uri.port, 443);
/// assert_eq!(uri.resource, "/chat?room=1");
/// assert_eq!(uri.host_header(), "example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub resource: String,
    pub secure: bool,
}

impl Uri {
    pub fn new(host: impl Into<String>, port: u16, resource: impl Into<String>, secure: bool) -> Self {
        let scheme = if secure { "wss" } else { "ws" };
        Self { scheme: scheme.to_owned(), host: host.into(), port, resource: resource.into(), secure }
    }

    /// Value of the `Host` header: the default ports are left out.
    pub fn host_header(&self) -> String {
        if self.port == PORT || self.port == SECURE_PORT {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Uri {
    type Err = HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uri = s.parse::<http::Uri>().map_err(HandshakeError::invalid_uri)?;

        let scheme = uri.scheme_str().ok_or_else(|| HandshakeError::invalid_uri("missing scheme"))?;
        let secure = match scheme.to_ascii_lowercase().as_str() {
            "ws" | "http" => false,
            "wss" | "https" => true,
            other => return Err(HandshakeError::invalid_uri(format!("unsupported scheme {other}"))),
        };

        let host = uri
            .host()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| HandshakeError::invalid_uri("missing host"))?;
        let port = uri.port_u16().unwrap_or(if secure { SECURE_PORT } else { PORT });
        let resource = uri.path_and_query().map_or("/", |path| path.as_str());
        let resource = if resource.is_empty() { "/" } else { resource };

        Ok(Self { scheme: scheme.to_owned(), host: host.to_owned(), port, resource: resource.to_owned(), secure })
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.host_header(), self.resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports_are_omitted_from_host() {
        assert_eq!(Uri::new("example.com", 80, "/", false).host_header(), "example.com");
        assert_eq!(Uri::new("example.com", 443, "/", true).host_header(), "example.com");
        assert_eq!(Uri::new("example.com", 8080, "/", false).host_header(), "example.com:8080");
        // the rule does not look at the scheme
        assert_eq!(Uri::new("example.com", 443, "/", false).host_header(), "example.com");
    }

    #[test]
    fn parse() {
        let uri: Uri = "ws://localhost:9001/echo".parse().unwrap();
        assert_eq!(uri, Uri::new("localhost", 9001, "/echo", false));
        assert_eq!(uri.to_string(), "ws://localhost:9001/echo");

        let uri: Uri = "ws://localhost".parse().unwrap();
        assert_eq!(uri.port, 80);
        assert_eq!(uri.resource, "/");
    }

    #[test]
    fn parse_rejects_other_schemes() {
        assert!(matches!("ftp://example.com/".parse::<Uri>(), Err(HandshakeError::InvalidUri { .. })));
        assert!(matches!("/relative".parse::<Uri>(), Err(HandshakeError::InvalidUri { .. })));
    }
}
